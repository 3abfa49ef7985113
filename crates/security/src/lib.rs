pub mod conversation;
pub mod pipeline;
pub mod scanners;

pub use conversation::{Action, AnalysisResult, ConversationAnalyzer};
pub use pipeline::{generate_marker, PipelineError, ScanPipeline, WorkerClient};
pub use scanners::{
    ClassifierError, CodeShieldScanner, CommandPatternScanner, CredentialScanner,
    NullPromptGuard, PromptGuardClassifier, PromptGuardScanner, Scanner, SensitivePathScanner,
};
