pub trait Rewriter {
    /// Rewrites a response body of the given `Content-Type`.
    fn rewrite(&self, input: &[u8], content_type: &str) -> crate::error::Result<Vec<u8>>;
}
