mod align;
mod args;
mod convert;
mod correct;
mod driver;
mod points;
mod progress;
mod types;

pub use align::AlignCommand;
pub use args::{AlignmentBackend, BackendMethod};
pub use correct::CorrectCommand;
pub use driver::{
    layer_configuration, MZAligner, MZAlignerCommand, MZAlignerError, CONFIG_FILE_NAME,
    ENV_PREFIX,
};
pub use points::ReferencePointsCommand;
pub use progress::ProgressRecord;
