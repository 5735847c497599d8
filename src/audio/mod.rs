//! Audio input from external capture and recognition processes

mod process;

pub use process::{ProcessMicrophone, ProcessRecognizer};
