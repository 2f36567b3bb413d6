pub mod dispatcher;
pub mod severity;
