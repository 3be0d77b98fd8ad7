pub mod mixture;
pub mod proposal;
pub mod random;
pub mod scale;
pub mod simplex;
pub mod tuning;

pub use mixture::{AdaptationPhase, AdaptiveReversibleJumpProposal, MixtureSlot, SlotStatistics};
pub use proposal::{Proposal, ProposalBase, ProposalError};
pub use scale::ScaleProposal;
pub use simplex::SimplexElementScaleProposal;
pub use tuning::{StepSize, TuningParameter, DEFAULT_TARGET_ACCEPTANCE};
