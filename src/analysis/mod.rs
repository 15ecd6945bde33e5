pub mod correlator;
pub mod dispatcher;
pub mod extractor;
pub mod transport;

#[cfg(test)]
mod tests;
