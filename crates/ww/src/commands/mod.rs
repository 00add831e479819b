//! CLI command implementations.

pub(crate) mod check;
pub(crate) mod render;
pub(crate) mod watch;

pub(crate) use check::CheckArgs;
pub(crate) use render::RenderArgs;
pub(crate) use watch::WatchArgs;
