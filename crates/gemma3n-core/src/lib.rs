pub mod backend;
pub mod error;
pub mod ffmpeg;
pub mod media;
pub mod message;
pub mod normalize;
pub mod pipeline;
pub mod sampler;
pub mod scratch;
pub mod tasks;

pub use backend::{BackendConfig, BackendHandle, GenerationBackend, Provider};
pub use error::{BackendError, PipelineError, PipelineResult};
pub use media::MediaKind;
pub use message::{CanonicalMessage, ContentPart, GenerationRequest, MediaRef, Role};
pub use normalize::ContentNormalizer;
pub use pipeline::{DispatchPipeline, DispatchRequest, RawMedia};
pub use sampler::{FrameSampler, FrameSet, SamplingConfig, VideoDecoder};
pub use scratch::{ScratchHandle, ScratchScope, ScratchSpace};
