//! Accept/reject decision source consulted before voting

use async_trait::async_trait;

/// Decides whether a proposed collage may use this participant's files
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Return true to vote YES
    async fn ask_user(&self, artifact: &[u8], filenames: &[String]) -> bool;
}

/// Oracle that always gives the same answer
#[derive(Debug, Clone, Copy)]
pub struct StaticOracle(pub bool);

impl StaticOracle {
    pub fn accept() -> Self {
        Self(true)
    }

    pub fn reject() -> Self {
        Self(false)
    }
}

#[async_trait]
impl Oracle for StaticOracle {
    async fn ask_user(&self, _artifact: &[u8], _filenames: &[String]) -> bool {
        self.0
    }
}

/// Synchronous closures work as oracles
#[async_trait]
impl<F> Oracle for F
where
    F: Fn(&[u8], &[String]) -> bool + Send + Sync,
{
    async fn ask_user(&self, artifact: &[u8], filenames: &[String]) -> bool {
        self(artifact, filenames)
    }
}
