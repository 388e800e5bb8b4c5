use crate::error::{Error, RegistryError, RenderError, TemplateError};
use crate::models::options::UbarsOptions;
use crate::partial_loader;
use crate::tpl::ast::Program;
use crate::tpl::cache::TemplateCache;
use crate::tpl::engine::{Template, parse_with};
use crate::tpl::helpers::{self, HelperDef};
use crate::tpl::render::Evaluator;
use crate::value::{Value, to_value};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::{debug, warn};

static DEFAULT_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Registry used by [`Template::render`] and [`crate::render`].
pub(crate) fn default_registry() -> &'static Registry {
    &DEFAULT_REGISTRY
}

/// Helpers, partials and cached templates shared by renders.
///
/// All methods take `&self`; a registry can be wrapped in an `Arc` and used
/// from many threads. Registration is expected to finish before rendering
/// starts, but interleaving is safe.
pub struct Registry {
    helpers: DashMap<String, Arc<dyn HelperDef>>,
    partial_sources: DashMap<String, String>,
    partials: DashMap<String, Arc<Program>>,
    templates: TemplateCache,
    options: UbarsOptions,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_options(UbarsOptions::default())
    }

    pub fn with_options(options: UbarsOptions) -> Self {
        let registry = Self {
            helpers: DashMap::new(),
            partial_sources: DashMap::new(),
            partials: DashMap::new(),
            templates: TemplateCache::default(),
            options,
        };
        for (name, helper) in helpers::builtins() {
            registry.helpers.insert(name.to_string(), helper);
        }
        registry
    }

    pub fn options(&self) -> &UbarsOptions {
        &self.options
    }

    pub fn register_helper(
        &self,
        name: &str,
        helper: impl HelperDef + 'static,
    ) -> Result<(), RegistryError> {
        let mut inserted = false;
        self.helpers.entry(name.to_string()).or_insert_with(|| {
            inserted = true;
            Arc::new(helper)
        });
        if !inserted {
            warn!("duplicate helper rejected: name={}", name);
            return Err(RegistryError::DuplicateHelper(name.to_string()));
        }
        debug!("register helper: name={}", name);
        Ok(())
    }

    pub fn remove_helper(&self, name: &str) -> bool {
        self.helpers.remove(name).is_some()
    }

    pub fn has_helper(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    pub(crate) fn helper(&self, name: &str) -> Option<Arc<dyn HelperDef>> {
        self.helpers.get(name).map(|h| h.value().clone())
    }

    /// Registers partial source. It is parsed on first use, so syntax errors
    /// surface from the render that first includes it.
    pub fn register_partial(
        &self,
        name: &str,
        source: impl Into<String>,
    ) -> Result<(), RegistryError> {
        if self.has_partial(name) {
            return Err(RegistryError::DuplicatePartial(name.to_string()));
        }
        self.partial_sources.insert(name.to_string(), source.into());
        debug!("register partial: name={}", name);
        Ok(())
    }

    pub fn register_partial_template(
        &self,
        name: &str,
        template: &Template,
    ) -> Result<(), RegistryError> {
        if self.has_partial(name) {
            return Err(RegistryError::DuplicatePartial(name.to_string()));
        }
        self.partials
            .insert(name.to_string(), template.shared_program());
        debug!("register compiled partial: name={}", name);
        Ok(())
    }

    /// Registers every file ending in `.{extension}` below `dir`. Names are
    /// the relative path without extension, `/`-separated.
    pub fn register_partials_directory(
        &self,
        dir: impl AsRef<Path>,
        extension: &str,
    ) -> Result<usize, RegistryError> {
        let dir = dir.as_ref();
        let files = partial_loader::load_dir(dir, extension)
            .map_err(|e| RegistryError::Load(format!("{:#}", e)))?;
        let count = files.len();
        for file in files {
            self.register_partial(&file.name, file.source)?;
        }
        debug!("loaded partials: dir={}, count={}", dir.display(), count);
        Ok(count)
    }

    /// Registers `(name, source)` pairs, usually produced by
    /// `partial_assets!`.
    pub fn register_partial_assets(&self, assets: &[(&str, &str)]) -> Result<usize, RegistryError> {
        for (name, source) in assets {
            self.register_partial(name, *source)?;
        }
        Ok(assets.len())
    }

    pub fn remove_partial(&self, name: &str) -> bool {
        let source = self.partial_sources.remove(name).is_some();
        let compiled = self.partials.remove(name).is_some();
        source || compiled
    }

    pub fn has_partial(&self, name: &str) -> bool {
        self.partials.contains_key(name) || self.partial_sources.contains_key(name)
    }

    pub(crate) fn partial(&self, name: &str) -> Result<Option<Arc<Program>>, RenderError> {
        if let Some(program) = self.partials.get(name) {
            return Ok(Some(program.value().clone()));
        }
        let source = match self.partial_sources.get(name) {
            Some(source) => source.value().clone(),
            None => return Ok(None),
        };
        let program = parse_with(&source, &self.options.compile).map_err(|source| {
            RenderError::PartialTemplate {
                name: name.to_string(),
                source,
            }
        })?;
        let program = Arc::new(program);
        self.partials.insert(name.to_string(), program.clone());
        debug!("compiled partial: name={}", name);
        Ok(Some(program))
    }

    /// Compiles with this registry's compile options.
    pub fn compile(&self, source: &str) -> Result<Template, TemplateError> {
        Template::compile_with(source, &self.options.compile)
    }

    pub fn render<T: Serialize + ?Sized>(
        &self,
        template: &Template,
        data: &T,
    ) -> Result<String, RenderError> {
        let value = to_value(data)?;
        self.render_value(template, &value)
    }

    pub fn render_value(&self, template: &Template, data: &Value) -> Result<String, RenderError> {
        self.render_program(template.program(), data, None)
    }

    /// Renders with an initial private-data frame (`@name` variables).
    pub fn render_program(
        &self,
        program: &Program,
        data: &Value,
        private_data: Option<BTreeMap<String, Value>>,
    ) -> Result<String, RenderError> {
        let start = Instant::now();
        let result = Evaluator::new(self).render(program, data, private_data.unwrap_or_default());
        debug!(
            "render: ok={}, elapsed_us={}",
            result.is_ok(),
            start.elapsed().as_micros()
        );
        result
    }

    /// Compiles `source` under `name` (cached until the source changes) and
    /// renders it.
    pub fn render_template<T: Serialize + ?Sized>(
        &self,
        name: &str,
        source: &str,
        data: &T,
    ) -> Result<String, Error> {
        let program = self
            .templates
            .get_or_compile(name, source, &self.options.compile)?;
        let value = to_value(data)?;
        Ok(self.render_program(&program, &value, None)?)
    }

    pub fn remove_template(&self, name: &str) -> bool {
        self.templates.remove(name)
    }
}
