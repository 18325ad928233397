//! Reference layout of the packed 32-byte terms contract parameters.
//!
//! Bit positions are big-endian: bit 255 is the most significant bit of
//! byte 0.
//!
//! | bits    | width | field                                   |
//! |---------|-------|-----------------------------------------|
//! | 255–248 | 8     | principal token index                   |
//! | 247–152 | 96    | principal amount                        |
//! | 151–128 | 24    | interest rate per unit (4 decimals)     |
//! | 127–124 | 4     | amortization unit                       |
//! | 123–108 | 16    | term length in amortization units       |
//! | 107–100 | 8     | collateral token index                  |
//! | 99–8    | 92    | collateral amount (0 = uncollateralized)|
//! | 7–0     | 8     | grace period in days                    |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::types::{Amount, TermsContractParameters};

/// Fixed-point scale of interest rates (4 decimal places).
pub const RATE_SCALE: u128 = 10_000;

/// 100% expressed in interest rate units.
pub const RATE_ONE_HUNDRED_PERCENT: u128 = 100 * RATE_SCALE;

const PRINCIPAL_BITS: u32 = 96;
const RATE_BITS: u32 = 24;
const COLLATERAL_AMOUNT_BITS: u32 = 92;

const fn mask(bits: u32) -> u128 {
    (1u128 << bits) - 1
}

/// Period over which interest accrues and installments fall due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmortizationUnit {
    Hours,
    Days,
    Weeks,
    /// 30 days.
    Months,
    /// 365 days.
    Years,
}

impl AmortizationUnit {
    /// Length of one unit in seconds.
    pub fn seconds(&self) -> u64 {
        match self {
            Self::Hours => 3_600,
            Self::Days => 86_400,
            Self::Weeks => 604_800,
            Self::Months => 2_592_000,
            Self::Years => 31_536_000,
        }
    }

    /// 4-bit wire code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Hours => 0,
            Self::Days => 1,
            Self::Weeks => 2,
            Self::Months => 3,
            Self::Years => 4,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, CoreError> {
        match code {
            0 => Ok(Self::Hours),
            1 => Ok(Self::Days),
            2 => Ok(Self::Weeks),
            3 => Ok(Self::Months),
            4 => Ok(Self::Years),
            other => Err(CoreError::UnknownAmortizationUnit(other)),
        }
    }
}

impl fmt::Display for AmortizationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hours => write!(f, "Hours"),
            Self::Days => write!(f, "Days"),
            Self::Weeks => write!(f, "Weeks"),
            Self::Months => write!(f, "Months"),
            Self::Years => write!(f, "Years"),
        }
    }
}

/// Collateral section of the parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralTerms {
    /// Index into the token registry.
    pub token_index: u8,
    /// Locked amount, non-zero.
    pub amount: Amount,
    /// Days after a missed expectation before collateral may be seized.
    pub grace_period_days: u8,
}

/// Decoded terms contract parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsParameters {
    /// Index into the token registry.
    pub principal_token_index: u8,
    pub principal_amount: Amount,
    /// Interest per amortization unit, see [`RATE_SCALE`].
    pub interest_rate: u32,
    pub amortization_unit: AmortizationUnit,
    /// Term length in amortization units.
    pub term_length: u16,
    /// `None` for uncollateralized agreements.
    pub collateral: Option<CollateralTerms>,
}

impl TermsParameters {
    /// Pack into the 32-byte wire form, rejecting values wider than their field.
    pub fn encode(&self) -> Result<TermsContractParameters, CoreError> {
        if self.principal_amount > mask(PRINCIPAL_BITS) {
            return Err(CoreError::FieldOverflow {
                field: "principal_amount",
                bits: PRINCIPAL_BITS,
            });
        }
        if self.interest_rate as u128 > mask(RATE_BITS) {
            return Err(CoreError::FieldOverflow {
                field: "interest_rate",
                bits: RATE_BITS,
            });
        }

        let (collateral_index, collateral_amount, grace) = match self.collateral {
            Some(c) => {
                if c.amount == 0 {
                    return Err(CoreError::InvalidTermsParameters(
                        "collateral section present with zero amount".into(),
                    ));
                }
                if c.amount > mask(COLLATERAL_AMOUNT_BITS) {
                    return Err(CoreError::FieldOverflow {
                        field: "collateral_amount",
                        bits: COLLATERAL_AMOUNT_BITS,
                    });
                }
                (c.token_index, c.amount, c.grace_period_days)
            }
            None => (0, 0, 0),
        };

        let high: u128 = ((self.principal_token_index as u128) << 120)
            | (self.principal_amount << 24)
            | self.interest_rate as u128;
        let low: u128 = ((self.amortization_unit.code() as u128) << 124)
            | ((self.term_length as u128) << 108)
            | ((collateral_index as u128) << 100)
            | (collateral_amount << 8)
            | grace as u128;

        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(&high.to_be_bytes());
        bytes[16..].copy_from_slice(&low.to_be_bytes());
        Ok(TermsContractParameters(bytes))
    }

    /// Unpack and validate the 32-byte wire form.
    pub fn decode(params: &TermsContractParameters) -> Result<Self, CoreError> {
        let mut high_bytes = [0u8; 16];
        let mut low_bytes = [0u8; 16];
        high_bytes.copy_from_slice(&params.0[..16]);
        low_bytes.copy_from_slice(&params.0[16..]);
        let high = u128::from_be_bytes(high_bytes);
        let low = u128::from_be_bytes(low_bytes);

        let amortization_unit = AmortizationUnit::from_code((low >> 124) as u8)?;
        let collateral_amount = (low >> 8) & mask(COLLATERAL_AMOUNT_BITS);
        let collateral = (collateral_amount != 0).then(|| CollateralTerms {
            token_index: ((low >> 100) & 0xff) as u8,
            amount: collateral_amount,
            grace_period_days: (low & 0xff) as u8,
        });

        Ok(Self {
            principal_token_index: (high >> 120) as u8,
            principal_amount: (high >> 24) & mask(PRINCIPAL_BITS),
            interest_rate: (high & mask(RATE_BITS)) as u32,
            amortization_unit,
            term_length: ((low >> 108) & 0xffff) as u16,
            collateral,
        })
    }

    /// Full term length in seconds.
    pub fn term_length_seconds(&self) -> u64 {
        self.term_length as u64 * self.amortization_unit.seconds()
    }
}
