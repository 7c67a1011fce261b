pub mod percept_log;

pub use percept_log::{PerceptRecord, load_percept_log, read_percept_log};
