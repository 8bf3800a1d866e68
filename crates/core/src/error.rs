/// Validation failures raised by the lifecycle engine.
///
/// Every variant is detected before any mutation is attempted. Skipped
/// entities inside a batch are not errors; they are reported as skip counts
/// on [`crate::batch::BatchOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// `advance` was called on a terminal state.
    #[error("state '{state}' has no forward transition")]
    NoForwardTransition { state: String },

    /// `revert` was called on a state with no predecessor.
    #[error("state '{state}' has no reverse transition")]
    NoReverseTransition { state: String },

    /// A revert (single or batch) was submitted without a non-blank reason.
    #[error("a non-empty reason is required to revert")]
    ReasonRequired,

    /// Leaving `state` requires a pickup name and none was supplied.
    #[error("a pickup name is required to advance past '{state}'")]
    PickupNameRequired { state: String },

    /// A batch advance included entities sitting in the pickup-required
    /// state. The whole batch is rejected; use the receiver action instead.
    #[error(
        "batch advance rejected: {} requisition(s) in '{state}' need a pickup name, use the receiver action instead ({})",
        serial_ids.len(),
        serial_ids.join(", ")
    )]
    BatchPreconditionViolated {
        state: String,
        serial_ids: Vec<String>,
    },

    /// No candidate passed the eligibility filter of a batch action.
    #[error("no eligible requisitions for batch action '{action}' ({candidates} candidate(s))")]
    EmptyEligibleSet { action: String, candidates: usize },

    /// A strict merge found an imported identity that already exists live.
    #[error("imported requisition '{id}' conflicts with an existing record")]
    MergeIdentityConflict { id: String },

    /// The entity's status is not a key of the workflow graph.
    #[error("unknown workflow state '{state}'")]
    UnknownState { state: String },

    /// The workflow table failed static validation.
    #[error("invalid workflow table: {message}")]
    InvalidWorkflow { message: String },

    /// Every sequence number of the day is taken.
    #[error("no serial left for {day}: sequences stop at {max}")]
    SerialSpaceExhausted { day: String, max: u32 },

    /// A draft or line item failed validation.
    #[error("invalid requisition: {message}")]
    InvalidRequisition { message: String },
}

impl EngineError {
    pub(crate) fn invalid_requisition(message: impl Into<String>) -> Self {
        EngineError::InvalidRequisition {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_workflow(message: impl Into<String>) -> Self {
        EngineError::InvalidWorkflow {
            message: message.into(),
        }
    }
}
