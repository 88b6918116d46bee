use plotters::drawing::DrawingAreaErrorKind;
use thiserror::Error;
#[derive(Debug, Error)]
pub enum PotentiostatError {
    #[error("hardware I/O failed: {0}")]
    HardwareIo(String),
    #[error("malformed record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("record sink I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to render plot: {0}")]
    Plot(String),
}
// 绘图后端和 PNG 编码的错误都归到 Plot 下
impl<E: std::error::Error + Send + Sync + 'static> From<DrawingAreaErrorKind<E>> for PotentiostatError {
    fn from(value: DrawingAreaErrorKind<E>) -> Self {
        PotentiostatError::Plot(format!("drawing: {value}"))
    }
}
impl From<image::ImageError> for PotentiostatError {
    fn from(value: image::ImageError) -> Self {
        PotentiostatError::Plot(format!("png encoding: {value}"))
    }
}
