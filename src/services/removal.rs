//! Background removal service
//!
//! [`BackgroundRemover`] is the byte-in/byte-out seam the pipeline talks to.
//! [`ModelRemovalService`] is the implementation backed by a segmentation
//! model running on one of the inference backends.

use crate::{
    backends::{BackendFactory, DefaultBackendFactory},
    cache::ModelCache,
    config::RemovalConfig,
    error::{CutoutError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, ModelManager, PreprocessingConfig},
    services::ImageCodec,
    utils::{ImagePreprocessor, MaskPostprocessor},
};
use image::{DynamicImage, RgbaImage};
use instant::Instant;
use std::sync::{Arc, Mutex, MutexGuard};

/// Removes the background of an encoded image
///
/// The returned bytes must decode to an image whose alpha channel is the
/// foreground cutout. Implementations are called from worker threads.
pub trait BackgroundRemover: Send + Sync {
    /// Remove the background of `input`, returning encoded image bytes
    ///
    /// # Errors
    /// - Input is not an image the service understands
    /// - The underlying model failed
    fn remove(&self, input: &[u8]) -> Result<Vec<u8>>;
}

impl<T: BackgroundRemover + ?Sized> BackgroundRemover for Arc<T> {
    fn remove(&self, input: &[u8]) -> Result<Vec<u8>> {
        (**self).remove(input)
    }
}

impl<T: BackgroundRemover + ?Sized> BackgroundRemover for Box<T> {
    fn remove(&self, input: &[u8]) -> Result<Vec<u8>> {
        (**self).remove(input)
    }
}

struct LoadedModel {
    backend: Box<dyn InferenceBackend + Send>,
    preprocessing: PreprocessingConfig,
}

/// Model-backed removal service
///
/// The model is resolved (and downloaded when missing) on first use. The
/// backend needs exclusive access for inference, so calls are serialized.
pub struct ModelRemovalService {
    config: RemovalConfig,
    factory: Arc<dyn BackendFactory>,
    state: Mutex<Option<LoadedModel>>,
}

impl std::fmt::Debug for ModelRemovalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRemovalService")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl ModelRemovalService {
    /// Create a service using the backends compiled into this build
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: RemovalConfig) -> Result<Self> {
        Self::with_factory(config, Arc::new(DefaultBackendFactory))
    }

    /// Create a service whose backends come from `factory`
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_factory(config: RemovalConfig, factory: Arc<dyn BackendFactory>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            factory,
            state: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.lock_state().is_some()
    }

    /// Load the model now instead of on the first call
    ///
    /// # Errors
    /// - Model resolution, download or backend initialization failed
    pub fn warm_up(&self) -> Result<()> {
        let mut state = self.lock_state();
        Self::ensure_loaded(&mut state, &self.config, self.factory.as_ref())?;
        Ok(())
    }

    /// Information about the loaded model
    ///
    /// # Errors
    /// - Model not loaded yet
    pub fn model_info(&self) -> Result<ModelInfo> {
        let state = self.lock_state();
        state
            .as_ref()
            .ok_or_else(|| CutoutError::model("model not loaded yet"))?
            .backend
            .model_info()
    }

    /// Cut out the foreground of a decoded image
    ///
    /// # Errors
    /// - Model loading or inference failures
    pub fn remove_image(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let dimensions = (image.width(), image.height());

        let prediction = {
            let mut state = self.lock_state();
            let loaded = Self::ensure_loaded(&mut state, &self.config, self.factory.as_ref())?;

            let preprocess_start = Instant::now();
            let (tensor, letterbox) =
                ImagePreprocessor::preprocess_for_inference(image, &loaded.preprocessing)?;
            log::debug!(
                "Preprocessed {}x{} image in {}ms",
                dimensions.0,
                dimensions.1,
                preprocess_start.elapsed().as_millis()
            );

            let inference_start = Instant::now();
            let output = loaded.backend.infer(&tensor)?;
            tracing::debug!(
                inference_ms = inference_start.elapsed().as_millis() as u64,
                "inference finished"
            );
            (output, letterbox)
        };

        let (output, letterbox) = prediction;
        let mask = MaskPostprocessor::tensor_to_mask(&output, &letterbox, dimensions)?;

        let mut cutout = image.to_rgba8();
        MaskPostprocessor::apply_alpha(&mut cutout, &mask)?;
        Ok(cutout)
    }

    /// Lock the model state, dropping a backend left behind by a panicked call
    fn lock_state(&self) -> MutexGuard<'_, Option<LoadedModel>> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("previous removal panicked, model will be reloaded");
            let mut state = poisoned.into_inner();
            *state = None;
            self.state.clear_poison();
            state
        })
    }

    fn ensure_loaded<'a>(
        state: &'a mut Option<LoadedModel>,
        config: &RemovalConfig,
        factory: &dyn BackendFactory,
    ) -> Result<&'a mut LoadedModel> {
        if state.is_none() {
            *state = Some(Self::load(config, factory)?);
        }
        state
            .as_mut()
            .ok_or_else(|| CutoutError::internal("model state missing after load"))
    }

    fn load(config: &RemovalConfig, factory: &dyn BackendFactory) -> Result<LoadedModel> {
        let cache = match &config.cache_dir {
            Some(dir) => ModelCache::with_custom_cache_dir(dir)?,
            None => ModelCache::new()?,
        };
        let model = ModelManager::resolve(&config.model_spec, &cache, config.auto_download)?;

        let mut backend = factory.create_backend(config.backend)?;
        let load_time = backend.initialize(&model, config)?;
        tracing::info!(
            model = %model.spec().source.display_name(),
            backend = %config.backend,
            load_ms = load_time.map(|d| d.as_millis() as u64),
            "removal model loaded"
        );

        Ok(LoadedModel {
            preprocessing: backend.preprocessing_config()?,
            backend,
        })
    }
}

impl BackgroundRemover for ModelRemovalService {
    #[tracing::instrument(name = "model_removal", skip_all, fields(input_bytes = input.len()))]
    fn remove(&self, input: &[u8]) -> Result<Vec<u8>> {
        let image = ImageCodec::decode(input).map_err(|e| {
            CutoutError::processing_stage_error("input decoding", &e.to_string(), None)
        })?;
        let cutout = self.remove_image(&image)?;
        ImageCodec::encode_rgba_png(&cutout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockBackendFactory;
    use crate::models::ModelSpec;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;
    use std::panic::AssertUnwindSafe;
    use tempfile::TempDir;

    fn service(temp_dir: &TempDir, factory: MockBackendFactory) -> ModelRemovalService {
        let model_path = temp_dir.path().join("mock.onnx");
        std::fs::write(&model_path, b"mock weights").unwrap();

        let config = RemovalConfig::builder()
            .model_spec(ModelSpec::external(&model_path))
            .cache_dir(temp_dir.path())
            .auto_download(false)
            .build()
            .unwrap();
        ModelRemovalService::with_factory(config, Arc::new(factory)).unwrap()
    }

    /// White 40x30 image with a black 20x14 block in the middle
    fn subject_png() -> Vec<u8> {
        let image = RgbImage::from_fn(40, 30, |x, y| {
            if (10..30).contains(&x) && (8..22).contains(&y) {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_remove_produces_alpha_cutout() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir, MockBackendFactory::default());

        let output = service.remove(&subject_png()).unwrap();
        let cutout = ImageCodec::decode_rgba(&output).unwrap();

        assert_eq!(cutout.dimensions(), (40, 30));
        assert!(cutout.get_pixel(20, 15).0[3] > 200);
        assert!(cutout.get_pixel(1, 1).0[3] < 50);
        // Color channels are kept
        assert_eq!(&cutout.get_pixel(20, 15).0[..3], &[0, 0, 0]);
    }

    #[test]
    fn test_model_loaded_once() {
        let temp_dir = TempDir::new().unwrap();
        let factory = MockBackendFactory::default();
        let counters = factory.counters.clone();
        let service = service(&temp_dir, factory);

        assert!(!service.is_initialized());
        service.remove(&subject_png()).unwrap();
        service.remove(&subject_png()).unwrap();

        assert!(service.is_initialized());
        assert_eq!(counters.initialize_calls(), 1);
        assert_eq!(counters.infer_calls(), 2);
        assert_eq!(service.model_info().unwrap().name, "external:mock.onnx");
    }

    #[test]
    fn test_undecodable_input_is_service_error() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir, MockBackendFactory::default());

        let err = service.remove(b"\x00\x01 not an image").unwrap_err();
        assert!(matches!(err, CutoutError::Service(_)));
        assert!(err.to_string().contains("input decoding"));
    }

    #[test]
    fn test_failed_initialization_is_retried() {
        let temp_dir = TempDir::new().unwrap();
        let factory = MockBackendFactory {
            fail_init: true,
            ..MockBackendFactory::default()
        };
        let counters = factory.counters.clone();
        let service = service(&temp_dir, factory);

        assert!(matches!(service.warm_up(), Err(CutoutError::Model(_))));
        assert!(service.remove(&subject_png()).is_err());
        assert_eq!(counters.initialize_calls(), 2);
        assert!(!service.is_initialized());
    }

    #[test]
    fn test_recovers_after_backend_panic() {
        let temp_dir = TempDir::new().unwrap();
        let factory = MockBackendFactory {
            panic_on_first_infer: true,
            ..MockBackendFactory::default()
        };
        let counters = factory.counters.clone();
        let service = service(&temp_dir, factory);

        let first = std::panic::catch_unwind(AssertUnwindSafe(|| service.remove(&subject_png())));
        assert!(first.is_err());

        // The half-used backend is discarded and the model loaded again
        let output = service.remove(&subject_png()).unwrap();
        assert_eq!(ImageCodec::decode_rgba(&output).unwrap().dimensions(), (40, 30));
        service.remove(&subject_png()).unwrap();

        assert!(service.is_initialized());
        assert_eq!(counters.initialize_calls(), 2);
        assert_eq!(counters.infer_calls(), 3);
    }

    #[test]
    fn test_inference_failure_propagates() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(
            &temp_dir,
            MockBackendFactory {
                fail_inference: true,
                ..MockBackendFactory::default()
            },
        );

        assert!(matches!(
            service.remove(&subject_png()),
            Err(CutoutError::Inference(_))
        ));
    }

    #[test]
    fn test_missing_builtin_model_without_download() {
        let temp_dir = TempDir::new().unwrap();
        let config = RemovalConfig::builder()
            .cache_dir(temp_dir.path())
            .auto_download(false)
            .build()
            .unwrap();
        let service =
            ModelRemovalService::with_factory(config, Arc::new(MockBackendFactory::default()))
                .unwrap();

        let err = service.warm_up().unwrap_err();
        assert!(err.to_string().contains("auto-download is disabled"));
    }

    #[test]
    fn test_trait_object_and_arc_delegate() {
        let temp_dir = TempDir::new().unwrap();
        let service: Arc<dyn BackgroundRemover> =
            Arc::new(service(&temp_dir, MockBackendFactory::default()));
        let boxed: Box<dyn BackgroundRemover> = Box::new(Arc::clone(&service));
        assert!(boxed.remove(&subject_png()).is_ok());
    }
}
