// src/drivers/mod.rs
// 声明同级目录下的子模块文件
pub mod channel;
pub mod envelope;
pub mod error;
pub mod loader;
pub mod plot;
pub mod waveform;
// 公开导出这些模块里的结构体，方便外部调用
pub use channel::{CalibratedChannel, CellModel, SampleChannel, SimulatedCell};
pub use envelope::{EnvelopeProcessor, EnvelopeSeries};
pub use error::PotentiostatError;
pub use loader::SeriesLoader;
pub use plot::{Figure, PlotSeries, PlotStyle, Plotter, PngPlotter};
pub use waveform::{
    Pacer, SleepPacer, SquareConfig, TriangularConfig, WaveformGenerator, WaveformKind,
};
