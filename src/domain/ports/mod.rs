mod corpus_loader;

pub use corpus_loader::{CorpusLoader, LoadOutcome, RecordError};
