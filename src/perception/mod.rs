pub mod llm_ocr;
pub mod screenshot;
pub mod traits;
pub mod types;

pub use traits::{Frame, OcrAdapter, ScreenCapture};
pub use types::{Position, Region, TextRegion};
