//! Process-local credit counter backing every paid action.

/// Raised when a paid action is attempted without enough balance. Carries
/// both sides so the message can be shown to the user as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("insufficient credits: this action costs {needed}, you have {available}")]
pub struct InsufficientCredits {
    pub needed: u32,
    pub available: u32,
}

/// Non-negative credit balance. Deductions are only performed after a
/// confirmed successful action, so `deduct` failing means a caller skipped
/// the `require` precondition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreditLedger {
    balance: u32,
}

impl CreditLedger {
    pub fn new(balance: u32) -> Self {
        Self { balance }
    }

    pub fn balance(&self) -> u32 {
        self.balance
    }

    pub fn can_afford(&self, cost: u32) -> bool {
        self.balance >= cost
    }

    /// Precondition check, before any backend call is made.
    pub fn require(&self, cost: u32) -> Result<(), InsufficientCredits> {
        if self.can_afford(cost) {
            Ok(())
        } else {
            Err(InsufficientCredits {
                needed: cost,
                available: self.balance,
            })
        }
    }

    pub fn deduct(&mut self, cost: u32) -> Result<(), InsufficientCredits> {
        match self.balance.checked_sub(cost) {
            Some(rest) => {
                self.balance = rest;
                Ok(())
            }
            None => Err(InsufficientCredits {
                needed: cost,
                available: self.balance,
            }),
        }
    }

    /// Admin-configured reset and verified purchase top-ups.
    pub fn credit(&mut self, amount: u32) {
        self.balance = self.balance.saturating_add(amount);
    }

    pub fn reset(&mut self, balance: u32) {
        self.balance = balance;
    }
}
