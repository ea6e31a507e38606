//! Loss functions for CartoonGAN training
//!
//! - Binary cross entropy of discriminator probability maps against a batch role
//! - Feature-space L1 distance for the reconstruction and content losses

use tch::{Reduction, Tensor};

/// Role of a batch shown to the discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchRole {
    /// Real cartoon images
    Real,
    /// Generator output
    GeneratedFake,
    /// Cartoon images with smoothed edges (hard negatives)
    EdgeDegraded,
}

impl BatchRole {
    /// Target probability for every patch of a batch with this role
    pub fn target(self) -> f64 {
        match self {
            BatchRole::Real => 1.0,
            BatchRole::GeneratedFake | BatchRole::EdgeDegraded => 0.0,
        }
    }

    /// Mean BCE between a probability map and this role's target
    pub fn bce(self, probs: &Tensor) -> Tensor {
        let targets = probs.full_like(self.target()).detach();
        probs.binary_cross_entropy::<Tensor>(&targets, None, Reduction::Mean)
    }
}

/// The three discriminator terms and their sum
#[derive(Debug)]
pub struct DiscriminatorLoss {
    pub real: Tensor,
    pub fake: Tensor,
    pub edge: Tensor,
    pub total: Tensor,
}

/// Discriminator loss: BCE(D(y), 1) + BCE(D(G(x)), 0) + BCE(D(e), 0)
///
/// # Arguments
///
/// * `real` - Discriminator output on cartoon images
/// * `fake` - Discriminator output on generated images
/// * `edge` - Discriminator output on edge-smoothed cartoons
pub fn discriminator_loss(real: &Tensor, fake: &Tensor, edge: &Tensor) -> DiscriminatorLoss {
    let real = BatchRole::Real.bce(real);
    let fake = BatchRole::GeneratedFake.bce(fake);
    let edge = BatchRole::EdgeDegraded.bce(edge);
    let total = &real + &fake + &edge;
    DiscriminatorLoss {
        real,
        fake,
        edge,
        total,
    }
}

/// Generator adversarial loss: the generator wants its output scored as real
pub fn adversarial_loss(fake: &Tensor) -> Tensor {
    BatchRole::Real.bce(fake)
}

/// `weight` * mean L1 distance between generated and source features
///
/// The source features are detached so no gradient reaches them.
pub fn content_loss(generated: &Tensor, source: &Tensor, weight: f64) -> Tensor {
    generated.l1_loss(&source.detach(), Reduction::Mean) * weight
}
