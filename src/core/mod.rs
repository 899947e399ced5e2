// Job execution: dispatch substrate and the end-to-end workflow

pub mod dispatcher;
pub mod workflow;

pub use dispatcher::*;
pub use workflow::*;
