mod json_corpus_loader;

pub use json_corpus_loader::JsonCorpusLoader;
