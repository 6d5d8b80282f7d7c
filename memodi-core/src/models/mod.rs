pub mod record;
pub mod transcript;

pub use record::ScoreRecord;
pub use transcript::{Role, Transcript, Turn};
