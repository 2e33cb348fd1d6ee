/// Result of an attempted ledger deduction. The deduction itself is atomic;
/// this tells the caller which branch the transaction took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeductionOutcome {
    Applied { new_balance: f64 },
    InsufficientBalance { remaining: f64 },
    /// A deduction for this job already exists. The balance was not touched.
    DuplicateCharge,
}
