//! The render engine: one note in, WeChat-ready HTML out.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ww_config::Config;

use crate::context::failure_placeholder;
use crate::correlator::{GatedResources, NullResources, ResourceSource, Snapshot};
use crate::elements::{DeferredElement, ElementRegistry, ROOT_SCOPE, splice_elements};
use crate::error::{HostError, RenderError, VaultError};
use crate::extension::{Extension, PostprocessContext, Tokenizer, WalkContext, Walked};
use crate::host::{HostRenderer, SettlePolicy, settle};
use crate::html::HtmlWriter;
use crate::lexer::Lexer;
use crate::properties::{ArticleProperties, split_front_matter};
use crate::token::Token;
use crate::tree::build_tree;
use crate::vault::Vault;

/// A note to render: vault path plus full Markdown including front matter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub path: String,
    pub markdown: String,
}

impl Note {
    pub fn new(path: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            markdown: markdown.into(),
        }
    }

    pub async fn load(vault: &dyn Vault, path: &str) -> Result<Self, VaultError> {
        Ok(Self::new(path, vault.read_to_string(path).await?))
    }
}

/// Result of one render.
#[derive(Debug, Default)]
pub struct RenderOutput {
    pub note_path: String,
    pub html: String,
    /// Degraded fragments and other non-fatal problems, in the order they occurred.
    pub warnings: Vec<String>,
    /// Deferred content still to be spliced, see [`RenderEngine::resolve_elements`].
    pub elements: Vec<(String, DeferredElement)>,
    pub properties: ArticleProperties,
}

/// Phase of the render currently in progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderState {
    #[default]
    Idle,
    Preparing,
    Tokenizing,
    Walking,
    Rendering,
    Postprocessing,
    Done,
}

/// Demand for one selector compared with what the host rendered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceCount {
    pub selector: &'static str,
    pub demanded: usize,
    pub available: usize,
}

impl ResourceCount {
    pub fn matches(&self) -> bool {
        self.demanded == self.available
    }
}

#[derive(Clone, Debug)]
struct EngineSettings {
    strict_resource_counts: bool,
    max_embed_depth: usize,
    failure_text: String,
    settle: SettlePolicy,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            strict_resource_counts: config.render.strict_resource_counts,
            max_embed_depth: config.render.max_embed_depth,
            failure_text: config.render.failure_text.clone(),
            settle: SettlePolicy::from(&config.host),
        }
    }
}

/// Builder for [`RenderEngine`]. Extensions keep the order they are added in.
pub struct RenderEngineBuilder {
    extensions: Vec<Box<dyn Extension>>,
    settings: EngineSettings,
}

impl RenderEngineBuilder {
    /// Append an extension.
    #[must_use]
    pub fn with(mut self, extension: impl Extension + 'static) -> Self {
        self.extensions.push(Box::new(extension));
        self
    }

    /// Append an already boxed extension.
    #[must_use]
    pub fn with_boxed(mut self, extension: Box<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Take render settings from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &Config) -> Self {
        self.settings = EngineSettings::from(config);
        self
    }

    pub fn build(self) -> RenderEngine {
        let mut tokenizers: Vec<Arc<dyn Tokenizer>> = Vec::new();
        let mut renderers: HashMap<&'static str, Arc<dyn Tokenizer>> = HashMap::new();
        for extension in &self.extensions {
            for tokenizer in extension.definition().tokenizers {
                if renderers.contains_key(tokenizer.name()) {
                    tracing::warn!(
                        extension = extension.name(),
                        tokenizer = tokenizer.name(),
                        "Duplicate tokenizer name, keeping the first registration"
                    );
                    continue;
                }
                renderers.insert(tokenizer.name(), Arc::clone(&tokenizer));
                tokenizers.push(tokenizer);
            }
        }
        RenderEngine {
            extensions: self.extensions,
            lexer: Lexer::new(&tokenizers),
            renderers,
            settings: self.settings,
            state: RenderState::Idle,
        }
    }
}

/// Drives prepare, tokenize, walk, render and postprocess over the
/// registered extensions.
///
/// Rendering takes `&mut self`, so renders on one engine never overlap.
/// Build separate engines for independent concurrent renders.
pub struct RenderEngine {
    extensions: Vec<Box<dyn Extension>>,
    lexer: Lexer,
    renderers: HashMap<&'static str, Arc<dyn Tokenizer>>,
    settings: EngineSettings,
    state: RenderState,
}

impl RenderEngine {
    pub fn builder() -> RenderEngineBuilder {
        RenderEngineBuilder {
            extensions: Vec::new(),
            settings: EngineSettings::from(&Config::default()),
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    /// Names of the registered extensions in registration order.
    pub fn extension_names(&self) -> Vec<&'static str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    /// Render `note`, first letting `host` render it for resource correlation.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::HostUnavailable`] if the host cannot render at
    /// all. A host failure for this note alone degrades to rendering without
    /// host fragments.
    pub async fn render(
        &mut self,
        note: &Note,
        host: &dyn HostRenderer,
    ) -> Result<RenderOutput, RenderError> {
        self.render_in_scope(note, host, ROOT_SCOPE).await
    }

    /// Render `note` against an existing resource source.
    pub async fn render_with_resources(
        &mut self,
        note: &Note,
        resources: &dyn ResourceSource,
    ) -> RenderOutput {
        self.render_resources_in_scope(note, resources, ROOT_SCOPE).await
    }

    /// [`render`](Self::render) with placeholder ids allocated under `scope`.
    async fn render_in_scope(
        &mut self,
        note: &Note,
        host: &dyn HostRenderer,
        scope: &str,
    ) -> Result<RenderOutput, RenderError> {
        let (_, body) = split_front_matter(&note.markdown);
        let mut warnings = Vec::new();

        let snapshot = match settle(host, body, &note.path, self.settings.settle).await {
            Ok(settled) => {
                if !settled.settled {
                    warnings.push(format!(
                        "host render of {} did not settle after {} polls",
                        note.path, settled.polls
                    ));
                }
                Some(Snapshot::parse(&note.path, &settled.html))
            }
            Err(e @ HostError::Unavailable(_)) => return Err(e.into()),
            Err(e @ HostError::Failed { .. }) => {
                tracing::warn!(note = %note.path, error = %e, "Host render failed");
                warnings.push(e.to_string());
                None
            }
        };

        let resources: &dyn ResourceSource = match &snapshot {
            Some(snapshot) => snapshot,
            None => &NullResources,
        };
        let mut output = self.render_resources_in_scope(note, resources, scope).await;
        warnings.append(&mut output.warnings);
        output.warnings = warnings;
        Ok(output)
    }

    async fn render_resources_in_scope(
        &mut self,
        note: &Note,
        resources: &dyn ResourceSource,
        scope: &str,
    ) -> RenderOutput {
        let (properties, body) = split_front_matter(&note.markdown);
        let mut warnings = Vec::new();

        self.state = RenderState::Preparing;
        for extension in &mut self.extensions {
            extension.prepare().await;
        }
        tracing::debug!(note = %note.path, extensions = self.extensions.len(), "Prepared");

        self.state = RenderState::Tokenizing;
        let mut root = self.parse(body);

        self.state = RenderState::Walking;
        let disabled = if self.settings.strict_resource_counts {
            self.disabled_selectors(&root, resources, &mut warnings)
        } else {
            HashSet::new()
        };
        let gated = GatedResources::new(resources, disabled);
        let mut elements = ElementRegistry::scoped(scope);
        let mut ctx = WalkContext {
            note_path: &note.path,
            properties: &properties,
            resources: &gated,
            elements: &mut elements,
            warnings: Vec::new(),
        };
        let claimed = self.walk(&mut root, &mut ctx).await;
        warnings.append(&mut ctx.warnings);
        tracing::debug!(note = %note.path, claimed, "Walked");

        self.state = RenderState::Rendering;
        let mut html = HtmlWriter::new(&self.renderers).render(&root);

        self.state = RenderState::Postprocessing;
        let pctx = PostprocessContext {
            note_path: &note.path,
            properties: &properties,
        };
        for extension in &mut self.extensions {
            match extension.postprocess(html.clone(), &pctx).await {
                Ok(next) => html = next,
                Err(e) => {
                    tracing::warn!(extension = extension.name(), error = %e, "Postprocess failed");
                    warnings.push(format!("{} postprocess failed: {e}", extension.name()));
                }
            }
        }

        self.state = RenderState::Done;
        RenderOutput {
            note_path: note.path.clone(),
            html,
            warnings,
            elements: elements.into_entries(),
            properties,
        }
    }

    /// Tally resource demand per selector against what `resources` holds.
    pub fn check_resources(
        &self,
        markdown: &str,
        resources: &dyn ResourceSource,
    ) -> Vec<ResourceCount> {
        let (_, body) = split_front_matter(markdown);
        let root = self.parse(body);
        self.resource_demand(&root)
            .into_iter()
            .map(|(selector, demanded)| ResourceCount {
                selector,
                demanded,
                available: resources.count(selector),
            })
            .collect()
    }

    /// Splice deferred elements into `output.html`.
    ///
    /// Embedded notes are rendered with this engine and resolved in turn, up
    /// to the configured depth; cycles and overly deep embeds become failure
    /// placeholders.
    ///
    /// # Errors
    ///
    /// Returns an error if the host becomes unavailable while rendering an
    /// embedded note.
    pub async fn resolve_elements(
        &mut self,
        output: &mut RenderOutput,
        host: &dyn HostRenderer,
        vault: &dyn Vault,
    ) -> Result<(), RenderError> {
        let entries = std::mem::take(&mut output.elements);
        let mut stack = vec![output.note_path.clone()];
        let html = std::mem::take(&mut output.html);
        output.html = self
            .resolve_at_depth(html, entries, host, vault, &mut stack, &mut output.warnings)
            .await?;
        Ok(())
    }

    /// Run every extension's `before_publish` hook in registration order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing hook.
    pub async fn before_publish(&mut self) -> Result<(), crate::error::ExtensionError> {
        for extension in &mut self.extensions {
            extension.before_publish().await?;
        }
        Ok(())
    }

    /// Tear down all extensions.
    pub async fn cleanup(&mut self) {
        for extension in &mut self.extensions {
            extension.cleanup().await;
        }
        self.state = RenderState::Idle;
    }

    fn parse(&self, body: &str) -> Token {
        build_tree(self.lexer.lex(body))
    }

    fn resource_demand(&self, root: &Token) -> BTreeMap<&'static str, usize> {
        let mut demand = BTreeMap::new();
        root.visit(&mut |token| {
            let selector = self
                .extensions
                .iter()
                .filter(|e| e.walks(&token.kind))
                .find_map(|e| e.resource_demand(token));
            if let Some(selector) = selector {
                *demand.entry(selector).or_insert(0) += 1;
            }
        });
        demand
    }

    fn disabled_selectors(
        &self,
        root: &Token,
        resources: &dyn ResourceSource,
        warnings: &mut Vec<String>,
    ) -> HashSet<String> {
        let mut disabled = HashSet::new();
        for (selector, demanded) in self.resource_demand(root) {
            let available = resources.count(selector);
            if demanded != available {
                tracing::warn!(
                    selector,
                    demanded,
                    available,
                    "Host fragment count differs from source, disabling selector"
                );
                warnings.push(format!(
                    "{selector}: {demanded} in source but {available} rendered by host; fragments not borrowed"
                ));
                disabled.insert(selector.to_owned());
            }
        }
        disabled
    }

    /// Pre-order walk. The first extension to claim a token ends the search
    /// for that token; children of claimed tokens are still visited.
    async fn walk(&mut self, root: &mut Token, ctx: &mut WalkContext<'_>) -> usize {
        let mut claimed = 0;
        for path in preorder_paths(root) {
            let Some(token) = token_at_mut(root, &path) else {
                continue;
            };
            for extension in &mut self.extensions {
                if !extension.walks(&token.kind) {
                    continue;
                }
                match extension.walk(token, ctx).await {
                    Ok(Walked::Claimed) => {
                        claimed += 1;
                        break;
                    }
                    Ok(Walked::Skipped) => {}
                    Err(e) => {
                        ctx.warn(extension.name(), e.to_string());
                        token.html = None;
                        break;
                    }
                }
            }
        }
        claimed
    }

    fn resolve_at_depth<'a>(
        &'a mut self,
        html: String,
        entries: Vec<(String, DeferredElement)>,
        host: &'a dyn HostRenderer,
        vault: &'a dyn Vault,
        stack: &'a mut Vec<String>,
        warnings: &'a mut Vec<String>,
    ) -> Pin<Box<dyn Future<Output = Result<String, RenderError>> + Send + 'a>> {
        Box::pin(async move {
            let mut resolved = Vec::with_capacity(entries.len());
            for (id, element) in entries {
                let DeferredElement::Note(path) = element else {
                    resolved.push((id, element));
                    continue;
                };
                let markup = if stack.contains(&path) {
                    warnings.push(format!("embed cycle through {path}"));
                    failure_placeholder(&self.settings.failure_text)
                } else if stack.len() > self.settings.max_embed_depth {
                    warnings.push(format!("embed of {path} exceeds the maximum depth"));
                    failure_placeholder(&self.settings.failure_text)
                } else {
                    match Note::load(vault, &path).await {
                        Ok(note) => {
                            let mut sub = self.render_in_scope(&note, host, &id).await?;
                            warnings.append(&mut sub.warnings);
                            stack.push(path);
                            let markup = self
                                .resolve_at_depth(sub.html, sub.elements, host, vault, stack, warnings)
                                .await;
                            stack.pop();
                            markup?
                        }
                        Err(e) => {
                            tracing::warn!(note = %path, error = %e, "Embedded note unreadable");
                            warnings.push(e.to_string());
                            failure_placeholder(&self.settings.failure_text)
                        }
                    }
                };
                resolved.push((id, DeferredElement::Html(markup)));
            }

            let (html, unmatched) = splice_elements(&html, &resolved);
            for id in unmatched {
                tracing::warn!(id = %id, "No placeholder for deferred element");
                warnings.push(format!("no placeholder element with id {id}"));
            }
            Ok(html)
        })
    }
}

fn preorder_paths(root: &Token) -> Vec<Vec<usize>> {
    fn collect(token: &Token, path: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        out.push(path.clone());
        for (i, child) in token.children.iter().enumerate() {
            path.push(i);
            collect(child, path, out);
            path.pop();
        }
    }
    let mut out = Vec::new();
    collect(root, &mut Vec::new(), &mut out);
    out
}

fn token_at_mut<'t>(root: &'t mut Token, path: &[usize]) -> Option<&'t mut Token> {
    path.iter()
        .try_fold(root, |token, &i| token.children.get_mut(i))
}
