//! Registry of externally supplied callbacks.
//!
//! Camouflage providers and manifest editors are named in configuration
//! by `(archive, class, method)`. The registry maps each reference to a
//! loader; a loader runs at most once per reference and its result is
//! cached, so every lookup of one reference returns the same `Arc`.
//!
//! Injector hooks are not registered here: they run inside the JVM and
//! the weaver only emits a call to them.

use crate::error::{SpliceError, SpliceResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;
use xmltree::Element;

/// Error returned by a callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Maps an original class body to `(field name, value)` pairs.
pub type CamouflageFn = dyn Fn(&[u8]) -> Result<Vec<(String, String)>, CallbackError> + Send + Sync;

/// Edits a manifest document in place.
///
/// Attribute keys are qualified names as written in the file, such as
/// `android:name`.
pub type ManifestEditorFn = dyn Fn(&mut Element) -> Result<(), CallbackError> + Send + Sync;

type Loader<T> = Box<dyn Fn() -> Result<Arc<T>, CallbackError> + Send + Sync>;

/// Archive name of the callbacks that ship with Splice.
pub const BUILTIN_ARCHIVE: &str = "builtin";

/// Field written by the built-in digest camouflage provider.
pub const DIGEST_FIELD: &str = "_SPLICE_DIGEST";

/// Identifies a callback by archive file name, class, and method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallbackRef {
    /// Archive file name under the provided directory.
    pub archive: String,
    /// Fully qualified class name.
    pub class: String,
    /// Method name.
    pub method: String,
}

impl CallbackRef {
    /// Creates a reference.
    pub fn new(
        archive: impl Into<String>,
        class: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            archive: archive.into(),
            class: class.into(),
            method: method.into(),
        }
    }

    /// The built-in provider that records a SHA-256 digest of the original body.
    pub fn builtin_digest() -> Self {
        Self::new(BUILTIN_ARCHIVE, "splice.Camouflage", "digest")
    }
}

impl fmt::Display for CallbackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.archive, self.class, self.method)
    }
}

/// Table of camouflage providers and manifest editors.
pub struct CallbackRegistry {
    camouflage_loaders: HashMap<CallbackRef, Loader<CamouflageFn>>,
    editor_loaders: HashMap<CallbackRef, Loader<ManifestEditorFn>>,
    camouflage: RwLock<HashMap<CallbackRef, Arc<CamouflageFn>>>,
    editors: RwLock<HashMap<CallbackRef, Arc<ManifestEditorFn>>>,
    loads: AtomicUsize,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut camouflage: Vec<_> = self.camouflage_loaders.keys().collect();
        camouflage.sort();
        let mut editors: Vec<_> = self.editor_loaders.keys().collect();
        editors.sort();
        f.debug_struct("CallbackRegistry")
            .field("camouflage", &camouflage)
            .field("editors", &editors)
            .finish()
    }
}

impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            camouflage_loaders: HashMap::new(),
            editor_loaders: HashMap::new(),
            camouflage: RwLock::new(HashMap::new()),
            editors: RwLock::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Creates a registry holding the built-in callbacks.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_camouflage(CallbackRef::builtin_digest(), digest_camouflage);
        registry
    }

    /// Registers a camouflage provider.
    pub fn register_camouflage<F>(&mut self, reference: CallbackRef, provider: F)
    where
        F: Fn(&[u8]) -> Result<Vec<(String, String)>, CallbackError> + Send + Sync + 'static,
    {
        let provider: Arc<CamouflageFn> = Arc::new(provider);
        self.register_camouflage_loader(reference, move || Ok(Arc::clone(&provider)));
    }

    /// Registers a loader that produces a camouflage provider on first use.
    pub fn register_camouflage_loader<L>(&mut self, reference: CallbackRef, loader: L)
    where
        L: Fn() -> Result<Arc<CamouflageFn>, CallbackError> + Send + Sync + 'static,
    {
        self.camouflage.write().remove(&reference);
        self.camouflage_loaders.insert(reference, Box::new(loader));
    }

    /// Registers a manifest editor.
    pub fn register_manifest_editor<F>(&mut self, reference: CallbackRef, editor: F)
    where
        F: Fn(&mut Element) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let editor: Arc<ManifestEditorFn> = Arc::new(editor);
        self.register_manifest_editor_loader(reference, move || Ok(Arc::clone(&editor)));
    }

    /// Registers a loader that produces a manifest editor on first use.
    pub fn register_manifest_editor_loader<L>(&mut self, reference: CallbackRef, loader: L)
    where
        L: Fn() -> Result<Arc<ManifestEditorFn>, CallbackError> + Send + Sync + 'static,
    {
        self.editors.write().remove(&reference);
        self.editor_loaders.insert(reference, Box::new(loader));
    }

    /// Resolves a camouflage provider.
    pub fn camouflage(&self, reference: &CallbackRef) -> SpliceResult<Arc<CamouflageFn>> {
        self.resolve(reference, &self.camouflage_loaders, &self.camouflage)
    }

    /// Resolves a manifest editor.
    pub fn manifest_editor(&self, reference: &CallbackRef) -> SpliceResult<Arc<ManifestEditorFn>> {
        self.resolve(reference, &self.editor_loaders, &self.editors)
    }

    /// Resolves and invokes a camouflage provider.
    pub fn run_camouflage(
        &self,
        reference: &CallbackRef,
        body: &[u8],
    ) -> SpliceResult<Vec<(String, String)>> {
        let provider = self.camouflage(reference)?;
        provider(body).map_err(|e| SpliceError::external_callback(reference, e))
    }

    /// Number of loaders run so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    fn resolve<T: ?Sized>(
        &self,
        reference: &CallbackRef,
        loaders: &HashMap<CallbackRef, Loader<T>>,
        cache: &RwLock<HashMap<CallbackRef, Arc<T>>>,
    ) -> SpliceResult<Arc<T>> {
        if let Some(loaded) = cache.read().get(reference) {
            return Ok(Arc::clone(loaded));
        }
        let loader = loaders
            .get(reference)
            .ok_or_else(|| SpliceError::external_callback(reference, "not registered"))?;
        let mut cache = cache.write();
        if let Some(loaded) = cache.get(reference) {
            return Ok(Arc::clone(loaded));
        }
        debug!(callback = %reference, "loading callback");
        let loaded = loader().map_err(|e| SpliceError::external_callback(reference, e))?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        cache.insert(reference.clone(), Arc::clone(&loaded));
        Ok(loaded)
    }
}

fn digest_camouflage(body: &[u8]) -> Result<Vec<(String, String)>, CallbackError> {
    let digest = Sha256::digest(body);
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    Ok(vec![(DIGEST_FIELD.to_string(), hex)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(method: &str) -> CallbackRef {
        CallbackRef::new("camo.jar", "edu.example.Camo", method)
    }

    #[test]
    fn unknown_reference_is_a_callback_error() {
        let registry = CallbackRegistry::new();
        match registry.camouflage(&reference("missing")) {
            Err(SpliceError::ExternalCallback { reference, reason }) => {
                assert_eq!(reference, "camo.jar:edu.example.Camo.missing");
                assert_eq!(reason, "not registered");
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn loaders_run_once() {
        let mut registry = CallbackRegistry::new();
        registry.register_camouflage_loader(reference("tag"), || {
            let provider: Arc<CamouflageFn> =
                Arc::new(|_: &[u8]| -> Result<Vec<(String, String)>, CallbackError> {
                    Ok(vec![("k1".to_string(), "v1".to_string())])
                });
            Ok(provider)
        });
        let first = registry.camouflage(&reference("tag")).unwrap();
        let second = registry.camouflage(&reference("tag")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.load_count(), 1);
    }

    #[test]
    fn failing_loader_is_reported() {
        let mut registry = CallbackRegistry::new();
        registry.register_manifest_editor_loader(reference("edit"), || Err("class not found".into()));
        let err = registry.manifest_editor(&reference("edit")).err().unwrap();
        assert!(err.to_string().contains("class not found"));
    }

    #[test]
    fn failing_provider_is_reported() {
        let mut registry = CallbackRegistry::new();
        registry.register_camouflage(reference("boom"), |_| Err("provider threw".into()));
        let err = registry.run_camouflage(&reference("boom"), b"body").unwrap_err();
        assert!(matches!(err, SpliceError::ExternalCallback { .. }));
    }

    #[test]
    fn builtin_digest_is_sha256_hex() {
        let registry = CallbackRegistry::with_builtins();
        let fields = registry
            .run_camouflage(&CallbackRef::builtin_digest(), b"abc")
            .unwrap();
        assert_eq!(
            fields,
            vec![(
                DIGEST_FIELD.to_string(),
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".to_string()
            )]
        );
    }
}
