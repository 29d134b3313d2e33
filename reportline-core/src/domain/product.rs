//! Product-level sales lines

use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::daily::DroppedField;
use super::metric::{parse_value, round_ratio};
use super::tenant::TenantKey;

/// One product's sales on one day for one tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductLine {
    pub tenant_key: TenantKey,
    pub date: NaiveDate,
    pub product_code: String,
    pub description: Option<String>,
    pub department_code: Option<String>,
    /// Filled from the department reference on read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_name: Option<String>,
    pub quantity: Option<Decimal>,
    pub sales_value: Option<Decimal>,
    pub sales_cost: Option<Decimal>,
    pub gross_profit: Option<Decimal>,
    pub gross_profit_percent: Option<Decimal>,
    pub stock_on_hand: Option<Decimal>,
}

/// A product line as extracted upstream, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductLineCandidate {
    #[serde(default, alias = "stock_code", alias = "code")]
    pub product_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "department")]
    pub department_code: Option<String>,
    #[serde(default, alias = "sales_qty", alias = "qty")]
    pub quantity: Option<JsonValue>,
    #[serde(default)]
    pub sales_value: Option<JsonValue>,
    #[serde(default)]
    pub sales_cost: Option<JsonValue>,
    #[serde(default, alias = "gp_value")]
    pub gross_profit: Option<JsonValue>,
    #[serde(default, alias = "gp_percent")]
    pub gross_profit_percent: Option<JsonValue>,
    #[serde(default, alias = "soh")]
    pub stock_on_hand: Option<JsonValue>,
}

impl ProductLineCandidate {
    pub fn new(product_code: &str) -> Self {
        Self {
            product_code: Some(product_code.to_string()),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_department(mut self, code: &str) -> Self {
        self.department_code = Some(code.to_string());
        self
    }

    pub fn with_quantity(mut self, quantity: impl Into<JsonValue>) -> Self {
        self.quantity = Some(quantity.into());
        self
    }

    pub fn with_sales(mut self, value: impl Into<JsonValue>, gp_percent: impl Into<JsonValue>) -> Self {
        self.sales_value = Some(value.into());
        self.gross_profit_percent = Some(gp_percent.into());
        self
    }
}

/// Validated lines for one batch, plus what was dropped
#[derive(Debug, Clone, Default)]
pub struct ValidatedLines {
    pub lines: Vec<ProductLine>,
    /// Whole lines rejected (no product code, duplicates)
    pub dropped_lines: usize,
    /// Individual fields degraded to absent
    pub dropped_fields: Vec<DroppedField>,
}

impl ValidatedLines {
    /// Total quantity sold across the batch, if any line reports one
    pub fn items_sold(&self) -> Option<Decimal> {
        items_sold(&self.lines)
    }
}

/// Total quantity across lines that report one
pub fn items_sold(lines: &[ProductLine]) -> Option<Decimal> {
    lines
        .iter()
        .filter_map(|l| l.quantity)
        .fold(None, |acc, q| Some(acc.unwrap_or(Decimal::ZERO) + q))
}

/// Validate product-line candidates for one (tenant, date).
///
/// Lines without a product code are dropped, duplicate codes keep the first
/// occurrence, and malformed numeric fields become absent.
pub fn validate_lines(
    tenant_key: TenantKey,
    date: NaiveDate,
    candidates: &[ProductLineCandidate],
) -> ValidatedLines {
    let mut result = ValidatedLines::default();
    let mut seen = HashSet::new();

    for (idx, candidate) in candidates.iter().enumerate() {
        let code = candidate
            .product_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let Some(code) = code else {
            result.dropped_lines += 1;
            result.dropped_fields.push(DroppedField {
                field: format!("lines[{}].product_code", idx),
                reason: "missing product code".to_string(),
            });
            continue;
        };

        let code = code.to_uppercase();
        if !seen.insert(code.clone()) {
            result.dropped_lines += 1;
            result.dropped_fields.push(DroppedField {
                field: format!("lines[{}].product_code", idx),
                reason: format!("duplicate product code {}", code),
            });
            continue;
        }

        let mut number = |name: &str, raw: &Option<JsonValue>| -> Option<Decimal> {
            let raw = raw.as_ref()?;
            match parse_value(raw) {
                Ok(v) => v,
                Err(reason) => {
                    result.dropped_fields.push(DroppedField {
                        field: format!("lines[{}].{}", idx, name),
                        reason,
                    });
                    None
                }
            }
        };

        let quantity = number("quantity", &candidate.quantity);
        let sales_value = number("sales_value", &candidate.sales_value);
        let sales_cost = number("sales_cost", &candidate.sales_cost);
        let gross_profit = number("gross_profit", &candidate.gross_profit);
        let reported_percent = number("gross_profit_percent", &candidate.gross_profit_percent);
        let stock_on_hand = number("stock_on_hand", &candidate.stock_on_hand);

        let gross_profit_percent = reported_percent.or_else(|| match (gross_profit, sales_value) {
            (Some(gp), Some(value)) if !value.is_zero() => {
                Some(round_ratio(gp * Decimal::ONE_HUNDRED / value))
            }
            _ => None,
        });

        let department_code = match candidate.department_code.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(dept) if is_department_code(dept) => Some(dept.to_uppercase()),
            Some(dept) => {
                result.dropped_fields.push(DroppedField {
                    field: format!("lines[{}].department_code", idx),
                    reason: format!("not a 4-character department code: {:?}", dept),
                });
                None
            }
        };

        let description = candidate
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        result.lines.push(ProductLine {
            tenant_key,
            date,
            product_code: code,
            description,
            department_code,
            department_name: None,
            quantity,
            sales_value,
            sales_cost,
            gross_profit,
            gross_profit_percent,
            stock_on_hand,
        });
    }

    result
}

/// Department codes are exactly four ASCII letters or digits
pub fn is_department_code(code: &str) -> bool {
    code.len() == 4 && code.chars().all(|c| c.is_ascii_alphanumeric())
}
