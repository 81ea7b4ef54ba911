//! Document hooks
//!
//! Hooks rewrite documents on their way into a storage engine (`pre_write`)
//! and on their way back out (`post_read`). A typical pair encrypts a field
//! before it is stored and decrypts it after it is read.
//!
//! # Example
//!
//! ```
//! use quire::prelude::*;
//!
//! struct Uppercase;
//!
//! impl DocumentHook for Uppercase {
//!     fn name(&self) -> &str {
//!         "uppercase"
//!     }
//!
//!     fn apply<'a>(&self, mut ctx: HookContext<'a>) -> Result<HookContext<'a>> {
//!         if let Some(serde_json::Value::String(s)) = ctx.doc.fields.get_mut("name") {
//!             *s = s.to_uppercase();
//!         }
//!         Ok(ctx)
//!     }
//! }
//!
//! let hooks = HookChain::new().with_pre_write(Uppercase);
//! assert_eq!(hooks.pre_write_len(), 1);
//! ```

use quire_core::{CollectionSchema, DocumentData, Result};
use std::fmt;
use std::sync::Arc;

/// What a hook sees: the document plus the collection it belongs to
pub struct HookContext<'a> {
    pub database_name: &'a str,
    pub primary_path: &'a str,
    pub schema: &'a CollectionSchema,
    pub doc: DocumentData,
}

/// A document transform run by the hook chain
pub trait DocumentHook: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    fn apply<'a>(&self, ctx: HookContext<'a>) -> Result<HookContext<'a>>;
}

/// Hook built from a closure over the document
pub struct FnHook<F> {
    name: String,
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(&mut DocumentData) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> DocumentHook for FnHook<F>
where
    F: Fn(&mut DocumentData) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply<'a>(&self, mut ctx: HookContext<'a>) -> Result<HookContext<'a>> {
        (self.f)(&mut ctx.doc)?;
        Ok(ctx)
    }
}

/// Ordered pre-write and post-read hooks of a database
///
/// Hooks run in registration order. The chain is fixed once the database is
/// open.
#[derive(Clone, Default)]
pub struct HookChain {
    pre_write: Vec<Arc<dyn DocumentHook>>,
    post_read: Vec<Arc<dyn DocumentHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pre_write(mut self, hook: impl DocumentHook + 'static) -> Self {
        self.pre_write.push(Arc::new(hook));
        self
    }

    pub fn with_post_read(mut self, hook: impl DocumentHook + 'static) -> Self {
        self.post_read.push(Arc::new(hook));
        self
    }

    pub fn pre_write_len(&self) -> usize {
        self.pre_write.len()
    }

    pub fn run_pre_write<'a>(&self, ctx: HookContext<'a>) -> Result<HookContext<'a>> {
        run(&self.pre_write, ctx)
    }

    pub fn run_post_read<'a>(&self, ctx: HookContext<'a>) -> Result<HookContext<'a>> {
        run(&self.post_read, ctx)
    }
}

fn run<'a>(hooks: &[Arc<dyn DocumentHook>], mut ctx: HookContext<'a>) -> Result<HookContext<'a>> {
    for hook in hooks {
        ctx = hook.apply(ctx)?;
    }
    Ok(ctx)
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |hooks: &[Arc<dyn DocumentHook>]| -> Vec<String> {
            hooks.iter().map(|h| h.name().to_string()).collect()
        };
        f.debug_struct("HookChain")
            .field("pre_write", &names(&self.pre_write))
            .field("post_read", &names(&self.post_read))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx<'a>(schema: &'a CollectionSchema) -> HookContext<'a> {
        HookContext {
            database_name: "db",
            primary_path: "id",
            schema,
            doc: DocumentData::from_value(json!({ "id": "a", "trail": "" })).unwrap(),
        }
    }

    fn append(tag: &'static str) -> FnHook<impl Fn(&mut DocumentData) -> Result<()>> {
        FnHook::new(tag, move |doc: &mut DocumentData| {
            let trail = doc.get("trail").and_then(|v| v.as_str()).unwrap_or("").to_string();
            doc.set("trail", json!(format!("{}{}", trail, tag)));
            Ok(())
        })
    }

    #[test]
    fn test_hooks_run_in_registration_order() {
        let schema = CollectionSchema::new("id");
        let chain = HookChain::new()
            .with_pre_write(append("a"))
            .with_pre_write(append("b"))
            .with_post_read(append("r"));

        let out = chain.run_pre_write(ctx(&schema)).unwrap();
        assert_eq!(out.doc.get("trail"), Some(&json!("ab")));

        let out = chain.run_post_read(ctx(&schema)).unwrap();
        assert_eq!(out.doc.get("trail"), Some(&json!("r")));
    }

    #[test]
    fn test_failing_hook_stops_chain() {
        let schema = CollectionSchema::new("id");
        let chain = HookChain::new()
            .with_pre_write(FnHook::new("fail", |_: &mut DocumentData| {
                Err(quire_core::QuireError::Storage("boom".into()))
            }))
            .with_pre_write(append("never"));

        assert!(chain.run_pre_write(ctx(&schema)).is_err());
    }

    #[test]
    fn test_debug_lists_names() {
        let chain = HookChain::new().with_pre_write(append("x"));
        assert!(format!("{:?}", chain).contains("\"x\""));
    }
}
