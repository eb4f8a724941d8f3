mod config;
mod escalation;
mod event;
mod notify;
mod observation;
mod profile;

pub use config::*;
pub use escalation::*;
pub use event::*;
pub use notify::*;
pub use observation::*;
pub use profile::*;
