//! Cross-module tests that drive the resolver end to end against in-process
//! providers, a temporary cache directory and an in-memory archive.
