use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::patch::nullable;

const MAX_NAME_CHARS: usize = 255;
const MAX_CATEGORY_CHARS: usize = 50;
// NUMERIC(10, 2): eight integer digits.
const MAX_AMOUNT_INTEGER_DIGITS: u32 = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenditureStatus {
    #[default]
    Pending,
    Approved,
}

impl ExpenditureStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpenditureStatus::Pending => "Pending",
            ExpenditureStatus::Approved => "Approved",
        }
    }
}

impl fmt::Display for ExpenditureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown expenditure status: {0}")]
pub struct StatusParseError(String);

impl FromStr for ExpenditureStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ExpenditureStatus::Pending),
            "Approved" => Ok(ExpenditureStatus::Approved),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

impl TryFrom<String> for ExpenditureStatus {
    type Error = StatusParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Expenditure record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Expenditure {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub date_of_expense: Date,
    pub amount: Decimal,
    pub category: Option<String>,
    pub notes: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ExpenditureStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewExpenditure {
    pub name: String,
    pub date_of_expense: Date,
    pub amount: Decimal,
    pub category: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub status: ExpenditureStatus,
}

impl NewExpenditure {
    pub fn validate(&self) -> AppResult<()> {
        check_name(&self.name)?;
        check_amount(self.amount)?;
        check_category(self.category.as_deref())
    }
}

/// Sparse update. Only these six keys are recognized; anything else in the request
/// body is dropped during deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenditurePatch {
    pub name: Option<String>,
    pub date_of_expense: Option<Date>,
    pub amount: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    pub status: Option<ExpenditureStatus>,
}

impl ExpenditurePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.date_of_expense.is_none()
            && self.amount.is_none()
            && self.category.is_none()
            && self.notes.is_none()
            && self.status.is_none()
    }

    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = self.name.as_deref() {
            check_name(name)?;
        }
        if let Some(amount) = self.amount {
            check_amount(amount)?;
        }
        if let Some(Some(category)) = self.category.as_ref() {
            check_category(Some(category))?;
        }
        Ok(())
    }
}

fn check_name(name: &str) -> AppResult<()> {
    let n = name.trim().chars().count();
    if n == 0 || name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::validation(format!(
            "name must be 1 to {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(())
}

fn check_category(category: Option<&str>) -> AppResult<()> {
    if category.is_some_and(|c| c.chars().count() > MAX_CATEGORY_CHARS) {
        return Err(AppError::validation(format!(
            "category cannot exceed {MAX_CATEGORY_CHARS} characters"
        )));
    }
    Ok(())
}

fn check_amount(amount: Decimal) -> AppResult<()> {
    if amount.normalize().scale() > 2 {
        return Err(AppError::validation("amount allows at most 2 decimal places"));
    }
    let limit = Decimal::from(10_i64.pow(MAX_AMOUNT_INTEGER_DIGITS));
    if amount.abs() >= limit {
        return Err(AppError::validation("amount is out of range"));
    }
    Ok(())
}
