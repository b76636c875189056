#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use defect_checker::core_modules::credential::Credential;
use defect_checker::{ClassifierConfig, InferenceBackend, InferenceError, InferenceRequest};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

/// A config with pacing and backoff switched off so tests run instantly.
pub fn test_config() -> ClassifierConfig {
    ClassifierConfig {
        request_interval: Duration::ZERO,
        retry_backoff: Duration::from_millis(1),
        ..ClassifierConfig::default()
    }
}

pub fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([90, 90, 90])));
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).expect("Error Encoding Fixture.");
    bytes
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    encoded(width, height, ImageFormat::Png)
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    encoded(width, height, ImageFormat::Jpeg)
}

/// One recorded inference call.
#[derive(Debug, Clone)]
pub struct Call {
    pub credential: String,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
}

type Responder = dyn Fn(&Call) -> Result<String, InferenceError> + Send + Sync;

/// Decodes every submitted image and answers through `respond`.
pub struct RecordingBackend {
    calls: Mutex<Vec<Call>>,
    respond: Box<Responder>,
    delay: Option<Box<dyn Fn(&Call) -> Duration + Send + Sync>>,
}

impl RecordingBackend {
    pub fn new(respond: impl Fn(&Call) -> Result<String, InferenceError> + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
            delay: None,
        }
    }

    /// Answers with the dimensions of the image it received, e.g. "256x128".
    pub fn echo_dimensions() -> Self {
        Self::new(|call| Ok(format!("{}x{}", call.width, call.height)))
    }

    pub fn with_delay(mut self, delay: impl Fn(&Call) -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for RecordingBackend {
    async fn generate(&self, credential: &Credential, request: &InferenceRequest) -> Result<String, InferenceError> {
        let bytes = STANDARD
            .decode(&request.image_base64)
            .map_err(|err| InferenceError::MalformedResponse(err.to_string()))?;
        let image = image::load_from_memory(&bytes).map_err(|err| InferenceError::MalformedResponse(err.to_string()))?;
        let call = Call {
            credential: credential.expose().to_string(),
            prompt: request.prompt.clone(),
            width: image.width(),
            height: image.height(),
        };
        self.calls.lock().unwrap().push(call.clone());

        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(&call)).await;
        }
        (self.respond)(&call)
    }
}
