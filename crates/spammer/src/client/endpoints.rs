//! Uniform random selection among redundant endpoints.

use rand::Rng;

/// A non-empty set of interchangeable endpoint base URLs.
#[derive(Clone, Debug)]
pub struct EndpointSet {
    endpoints: Vec<String>,
}

impl EndpointSet {
    /// Create a set. Returns `None` if `endpoints` is empty.
    pub fn new(endpoints: Vec<String>) -> Option<Self> {
        if endpoints.is_empty() {
            return None;
        }
        let endpoints = endpoints
            .into_iter()
            .map(|e| e.trim_end_matches('/').to_string())
            .collect();
        Some(Self { endpoints })
    }

    /// Pick one endpoint uniformly at random.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        &self.endpoints[rng.gen_range(0..self.endpoints.len())]
    }
}
