//! Host renderer boundary and the settle loop.
//!
//! Hosts fill rendered blocks asynchronously and rarely say when they are
//! done. [`settle`] polls frames until the host reports completion or the
//! output stops changing, bounded by [`SettlePolicy::max_polls`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ww_config::HostConfig;

use crate::error::HostError;

/// One observation of the host's rendered output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostFrame {
    pub html: String,
    /// Set when the host knows its rendering, including async fill-in, is done.
    pub complete: bool,
}

/// The host's own Markdown renderer.
///
/// Implementations are single-flight per note: callers must not render the
/// same note twice concurrently.
#[async_trait]
pub trait HostRenderer: Send + Sync {
    /// Start rendering `markdown` for `note_path` into an off-screen container.
    async fn render(&self, markdown: &str, note_path: &str) -> Result<(), HostError>;

    /// Current contents of the container for `note_path`.
    async fn frame(&self, note_path: &str) -> Result<HostFrame, HostError>;
}

/// Serves fixed, already complete snapshots keyed by note path.
///
/// Notes without a snapshot render to an empty container, so every fragment
/// they would borrow is missing.
#[derive(Clone, Debug, Default)]
pub struct StaticHost {
    snapshots: HashMap<String, String>,
}

impl StaticHost {
    /// A host that renders nothing for any note.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn for_note(note_path: impl Into<String>, html: impl Into<String>) -> Self {
        Self::empty().with_snapshot(note_path, html)
    }

    #[must_use]
    pub fn with_snapshot(mut self, note_path: impl Into<String>, html: impl Into<String>) -> Self {
        self.snapshots.insert(note_path.into(), html.into());
        self
    }
}

#[async_trait]
impl HostRenderer for StaticHost {
    async fn render(&self, _markdown: &str, _note_path: &str) -> Result<(), HostError> {
        Ok(())
    }

    async fn frame(&self, note_path: &str) -> Result<HostFrame, HostError> {
        Ok(HostFrame {
            html: self.snapshots.get(note_path).cloned().unwrap_or_default(),
            complete: true,
        })
    }
}

/// Bounds for [`settle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SettlePolicy {
    pub interval: Duration,
    pub max_polls: u32,
    pub stable_polls: u32,
}

impl From<&HostConfig> for SettlePolicy {
    fn from(config: &HostConfig) -> Self {
        Self {
            interval: config.settle_interval(),
            max_polls: config.settle_max_polls,
            stable_polls: config.settle_stable_polls,
        }
    }
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self::from(&HostConfig::default())
    }
}

/// Result of [`settle`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settled {
    pub html: String,
    /// `false` when the poll cap was hit before the output settled.
    pub settled: bool,
    pub polls: u32,
}

/// Render `markdown` with the host and wait for the output to settle.
///
/// # Errors
///
/// Propagates host errors from `render` or `frame`.
pub async fn settle(
    host: &dyn HostRenderer,
    markdown: &str,
    note_path: &str,
    policy: SettlePolicy,
) -> Result<Settled, HostError> {
    host.render(markdown, note_path).await?;

    let max_polls = policy.max_polls.max(1);
    let mut last: Option<String> = None;
    let mut stable = 0;

    for poll in 1..=max_polls {
        let frame = host.frame(note_path).await?;
        if frame.complete {
            return Ok(Settled {
                html: frame.html,
                settled: true,
                polls: poll,
            });
        }

        stable = if last.as_deref() == Some(frame.html.as_str()) {
            stable + 1
        } else {
            1
        };
        if stable >= policy.stable_polls.max(1) {
            return Ok(Settled {
                html: frame.html,
                settled: true,
                polls: poll,
            });
        }
        last = Some(frame.html);

        if poll < max_polls {
            tokio::time::sleep(policy.interval).await;
        }
    }

    tracing::warn!(note = note_path, polls = max_polls, "host output did not settle");
    Ok(Settled {
        html: last.unwrap_or_default(),
        settled: false,
        polls: max_polls,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;

    /// Replays a scripted frame sequence, repeating the last one.
    struct ScriptedHost {
        frames: Mutex<Vec<HostFrame>>,
    }

    impl ScriptedHost {
        fn new(frames: &[(&str, bool)]) -> Self {
            let mut frames: Vec<_> = frames
                .iter()
                .map(|(html, complete)| HostFrame {
                    html: (*html).to_owned(),
                    complete: *complete,
                })
                .collect();
            frames.reverse();
            Self {
                frames: Mutex::new(frames),
            }
        }
    }

    #[async_trait]
    impl HostRenderer for ScriptedHost {
        async fn render(&self, _markdown: &str, _note_path: &str) -> Result<(), HostError> {
            Ok(())
        }

        async fn frame(&self, _note_path: &str) -> Result<HostFrame, HostError> {
            let mut frames = self.frames.lock().unwrap();
            if frames.len() > 1 {
                Ok(frames.pop().unwrap())
            } else {
                Ok(frames[0].clone())
            }
        }
    }

    struct DeadHost;

    #[async_trait]
    impl HostRenderer for DeadHost {
        async fn render(&self, _markdown: &str, _note_path: &str) -> Result<(), HostError> {
            Err(HostError::Unavailable("plugin unloaded".to_owned()))
        }

        async fn frame(&self, _note_path: &str) -> Result<HostFrame, HostError> {
            unreachable!()
        }
    }

    fn policy(max_polls: u32, stable_polls: u32) -> SettlePolicy {
        SettlePolicy {
            interval: Duration::from_millis(1),
            max_polls,
            stable_polls,
        }
    }

    #[tokio::test]
    async fn test_static_host_settles_immediately() {
        let host = StaticHost::for_note("n.md", "<p>x</p>");
        let settled = settle(&host, "x", "n.md", policy(5, 2)).await.unwrap();
        assert_eq!(settled.html, "<p>x</p>");
        assert!(settled.settled);
        assert_eq!(settled.polls, 1);
    }

    #[tokio::test]
    async fn test_static_host_is_empty_for_other_notes() {
        let host = StaticHost::for_note("a.md", "<p>a</p>").with_snapshot("b.md", "<p>b</p>");
        assert_eq!(host.frame("b.md").await.unwrap().html, "<p>b</p>");
        let other = host.frame("c.md").await.unwrap();
        assert_eq!(other.html, "");
        assert!(other.complete);
    }

    #[tokio::test]
    async fn test_settles_on_identical_frames() {
        let host = ScriptedHost::new(&[("a", false), ("ab", false), ("abc", false)]);
        let settled = settle(&host, "x", "n.md", policy(10, 2)).await.unwrap();
        assert_eq!(settled.html, "abc");
        assert!(settled.settled);
        assert_eq!(settled.polls, 4);
    }

    #[tokio::test]
    async fn test_complete_flag_wins() {
        let host = ScriptedHost::new(&[("a", false), ("ab", true)]);
        let settled = settle(&host, "x", "n.md", policy(10, 3)).await.unwrap();
        assert_eq!(settled.html, "ab");
        assert_eq!(settled.polls, 2);
    }

    #[tokio::test]
    async fn test_cap_returns_last_frame_unsettled() {
        let host = ScriptedHost::new(&[("a", false), ("b", false), ("c", false), ("d", false)]);
        let settled = settle(&host, "x", "n.md", policy(3, 2)).await.unwrap();
        assert_eq!(settled.html, "c");
        assert!(!settled.settled);
        assert_eq!(settled.polls, 3);
    }

    #[tokio::test]
    async fn test_host_error_propagates() {
        let err = settle(&DeadHost, "x", "n.md", policy(3, 2)).await.unwrap_err();
        assert!(matches!(err, HostError::Unavailable(_)));
    }
}
