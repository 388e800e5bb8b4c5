use crate::error::TemplateError;
use crate::models::options::CompileOptions;
use crate::tpl::ast::Program;
use crate::tpl::engine::parse_with;
use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Clone)]
pub struct CachedTemplate {
    pub program: Arc<Program>,
    pub content_hash: u64,
}

/// Compiled programs keyed by template name.
///
/// An entry is reused only while the source hashes the same; a changed
/// source is compiled again and replaces it.
#[derive(Default)]
pub(crate) struct TemplateCache {
    entries: DashMap<String, CachedTemplate>,
}

impl TemplateCache {
    pub fn get_or_compile(
        &self,
        name: &str,
        source: &str,
        options: &CompileOptions,
    ) -> Result<Arc<Program>, TemplateError> {
        let new_hash = content_hash(source);

        if let Some(cached) = self.entries.get(name) {
            if cached.content_hash == new_hash {
                trace!("template cache hit: name={}", name);
                return Ok(cached.program.clone());
            }
        }

        debug!("template cache miss: name={}, bytes={}", name, source.len());
        let program = Arc::new(parse_with(source, options)?);
        self.entries.insert(
            name.to_string(),
            CachedTemplate {
                program: program.clone(),
                content_hash: new_hash,
            },
        );
        Ok(program)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn content_hash(source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}
