//! Product and department rankings over a date window

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::metric::round_ratio;
use super::product::ProductLine;
use super::result::{Error, Result};

/// Inclusive calendar date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(Error::InvalidRange(format!("{} is after {}", from, to)));
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

/// Gross-profit percent cut-off for low-margin queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Threshold(Decimal);

impl Threshold {
    pub fn new(percent: Decimal) -> Self {
        Self(percent)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Threshold {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_end_matches('%').trim();
        Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map(Self)
            .map_err(|_| Error::InvalidThreshold(format!("'{}' is not a number", s)))
    }
}

impl TryFrom<f64> for Threshold {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(Error::InvalidThreshold(format!("{} is not finite", value)));
        }
        Decimal::from_f64(value)
            .map(Self)
            .ok_or_else(|| Error::InvalidThreshold(format!("{} is out of range", value)))
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Lines for one product identity summed over a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAggregate {
    pub product_code: String,
    pub description: Option<String>,
    pub department_code: Option<String>,
    pub total_quantity: Decimal,
    pub total_sales_value: Decimal,
    /// Mean of the reported gross-profit percents, absent when none reported
    pub avg_gp_percent: Option<Decimal>,
    pub line_count: usize,
}

#[derive(Default)]
struct ProductAccumulator {
    department: Option<(NaiveDate, String)>,
    quantity: Decimal,
    value: Decimal,
    gp_sum: Decimal,
    gp_count: u32,
    lines: usize,
}

/// Group lines by (product_code, description), ordered by that key
pub fn group_products(lines: &[ProductLine]) -> Vec<ProductAggregate> {
    let mut groups: BTreeMap<(String, Option<String>), ProductAccumulator> = BTreeMap::new();

    for line in lines {
        let acc = groups
            .entry((line.product_code.clone(), line.description.clone()))
            .or_default();
        acc.quantity += line.quantity.unwrap_or_default();
        acc.value += line.sales_value.unwrap_or_default();
        if let Some(gp) = line.gross_profit_percent {
            acc.gp_sum += gp;
            acc.gp_count += 1;
        }
        if let Some(dept) = &line.department_code {
            let newer = acc
                .department
                .as_ref()
                .map_or(true, |(seen, _)| line.date >= *seen);
            if newer {
                acc.department = Some((line.date, dept.clone()));
            }
        }
        acc.lines += 1;
    }

    groups
        .into_iter()
        .map(|((product_code, description), acc)| ProductAggregate {
            product_code,
            description,
            department_code: acc.department.map(|(_, code)| code),
            total_quantity: acc.quantity.normalize(),
            total_sales_value: acc.value.normalize(),
            avg_gp_percent: (acc.gp_count > 0)
                .then(|| round_ratio(acc.gp_sum / Decimal::from(acc.gp_count))),
            line_count: acc.lines,
        })
        .collect()
}

fn by_identity(a: &ProductAggregate, b: &ProductAggregate) -> Ordering {
    a.product_code
        .cmp(&b.product_code)
        .then_with(|| a.description.cmp(&b.description))
}

/// Top sellers by summed quantity, ignoring groups with nothing sold
pub fn best_sellers(lines: &[ProductLine], limit: usize) -> Vec<ProductAggregate> {
    let mut groups: Vec<_> = group_products(lines)
        .into_iter()
        .filter(|g| g.total_quantity > Decimal::ZERO)
        .collect();
    groups.sort_by(|a, b| {
        b.total_quantity
            .cmp(&a.total_quantity)
            .then_with(|| by_identity(a, b))
    });
    groups.truncate(limit);
    groups
}

/// Top sellers by summed sales value
pub fn best_sellers_by_value(lines: &[ProductLine], limit: usize) -> Vec<ProductAggregate> {
    let mut groups: Vec<_> = group_products(lines)
        .into_iter()
        .filter(|g| g.total_sales_value > Decimal::ZERO)
        .collect();
    groups.sort_by(|a, b| {
        b.total_sales_value
            .cmp(&a.total_sales_value)
            .then_with(|| by_identity(a, b))
    });
    groups.truncate(limit);
    groups
}

/// Whether `department` is covered by one of the exclusion entries.
///
/// An entry matches exactly or as a prefix, ignoring case.
pub fn is_excluded(department: Option<&str>, exclude: &[String]) -> bool {
    let Some(department) = department else {
        return false;
    };
    let department = department.to_ascii_uppercase();
    exclude
        .iter()
        .map(|e| e.trim().to_ascii_uppercase())
        .filter(|e| !e.is_empty())
        .any(|e| department.starts_with(&e))
}

/// Products selling at or under `threshold` gross-profit percent, worst first
pub fn low_margin(
    lines: &[ProductLine],
    threshold: Threshold,
    limit: usize,
    exclude: &[String],
) -> Vec<ProductAggregate> {
    let mut groups: Vec<_> = group_products(lines)
        .into_iter()
        .filter(|g| g.total_sales_value > Decimal::ZERO)
        .filter(|g| matches!(g.avg_gp_percent, Some(gp) if gp <= threshold.value()))
        .filter(|g| !is_excluded(g.department_code.as_deref(), exclude))
        .collect();
    groups.sort_by(|a, b| {
        a.avg_gp_percent
            .cmp(&b.avg_gp_percent)
            .then_with(|| by_identity(a, b))
    });
    groups.truncate(limit);
    groups
}

/// Lines for one department summed over a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentAggregate {
    pub department_code: String,
    /// Filled from the department reference when known
    pub department_name: Option<String>,
    pub total_quantity: Decimal,
    pub total_sales_value: Decimal,
    pub total_gross_profit: Decimal,
    pub gp_percent: Option<Decimal>,
    pub product_count: usize,
}

/// Departments ranked by sales value. Lines without a department are skipped.
pub fn top_departments(lines: &[ProductLine], limit: usize) -> Vec<DepartmentAggregate> {
    let mut groups: BTreeMap<&str, (Decimal, Decimal, Decimal, Option<&str>, Vec<&str>)> =
        BTreeMap::new();

    for line in lines {
        let Some(code) = line.department_code.as_deref() else {
            continue;
        };
        let entry = groups.entry(code).or_default();
        entry.0 += line.quantity.unwrap_or_default();
        entry.1 += line.sales_value.unwrap_or_default();
        entry.2 += line.gross_profit.unwrap_or_default();
        if entry.3.is_none() {
            entry.3 = line.department_name.as_deref();
        }
        if !entry.4.contains(&line.product_code.as_str()) {
            entry.4.push(&line.product_code);
        }
    }

    let mut departments: Vec<DepartmentAggregate> = groups
        .into_iter()
        .map(|(code, (quantity, value, gp, name, products))| DepartmentAggregate {
            department_code: code.to_string(),
            department_name: name.map(str::to_string),
            total_quantity: quantity.normalize(),
            total_sales_value: value.normalize(),
            total_gross_profit: gp.normalize(),
            gp_percent: (!value.is_zero())
                .then(|| round_ratio(gp * Decimal::ONE_HUNDRED / value)),
            product_count: products.len(),
        })
        .collect();

    departments.sort_by(|a, b| {
        b.total_sales_value
            .cmp(&a.total_sales_value)
            .then_with(|| a.department_code.cmp(&b.department_code))
    });
    departments.truncate(limit);
    departments
}
