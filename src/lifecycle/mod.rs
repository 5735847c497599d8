//! Process lifecycle: OS signals and cooperative stop across worker threads

mod shutdown;
mod stop;

pub use shutdown::ShutdownSignal;
pub use stop::StopToken;
