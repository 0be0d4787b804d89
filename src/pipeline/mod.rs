/*!
 * Document translation pipeline.
 *
 * - `segmenter`: page selection and splitting into parts
 * - `rate_limit`: token bucket shared by every engine request
 * - `dispatcher`: rate-limited, retrying engine calls producing tickets
 * - `progress`: coalescing progress snapshots
 * - `assembler`: page-order reconstruction and output variants
 * - `render`: text layout of the output variants
 * - `memory`: peak resident memory sampling
 * - `orchestrator`: runs the stages for one document
 */

pub mod assembler;
pub mod dispatcher;
pub mod memory;
pub mod orchestrator;
pub mod progress;
pub mod rate_limit;
pub mod render;
pub mod segmenter;

pub use assembler::{
    Assembler, FailedUnit, Layout, OutputFailure, OutputOptions, OutputTarget, OutputVariant, TranslationResult,
    WatermarkMode,
};
pub use dispatcher::{
    DispatchConfig, DispatchTicket, Dispatcher, FailureReason, RetryPolicy, TicketOrigin, TicketState, TicketStream,
};
pub use orchestrator::{PipelineConfig, PipelineRun, TranslationPipeline};
pub use progress::{ProgressAggregator, ProgressSnapshot, ProgressStream, Stage};
pub use rate_limit::TokenBucket;
pub use segmenter::{PageSelector, Part, segment};
pub use tokio_util::sync::CancellationToken;
