//! Daily metric catalogue and value parsing

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Decimal places kept for every stored metric (DECIMAL(18,4))
pub const METRIC_SCALE: u32 = 4;

/// Decimal places for ratios and averages
pub const RATIO_SCALE: u32 = 2;

/// Largest magnitude that fits DECIMAL(18,4)
const METRIC_LIMIT: i64 = 100_000_000_000_000;

/// How a metric aggregates into a monthly or yearly rollup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Summed across days
    Additive,
    /// Recomputed from summed numerator/denominator pairs
    Ratio,
    /// First non-null value in the period
    Opening,
    /// Last non-null value in the period
    Closing,
}

/// A named daily metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Turnover,
    GpValue,
    GpPercent,
    CostOfSales,
    Purchases,
    TransactionCount,
    ScriptCount,
    AvgBasketValue,
    AvgBasketSize,
    AvgScriptValue,
    DispensaryTurnover,
    StockOpening,
    StockClosing,
    StockAdjustment,
    SalesCash,
    SalesAccount,
    SalesCod,
    TypeRSales,
}

impl Metric {
    pub const ALL: [Metric; 18] = [
        Metric::Turnover,
        Metric::GpValue,
        Metric::GpPercent,
        Metric::CostOfSales,
        Metric::Purchases,
        Metric::TransactionCount,
        Metric::ScriptCount,
        Metric::AvgBasketValue,
        Metric::AvgBasketSize,
        Metric::AvgScriptValue,
        Metric::DispensaryTurnover,
        Metric::StockOpening,
        Metric::StockClosing,
        Metric::StockAdjustment,
        Metric::SalesCash,
        Metric::SalesAccount,
        Metric::SalesCod,
        Metric::TypeRSales,
    ];

    /// Fields recomputed from the winning source instead of merged one by one
    pub const DERIVED: [Metric; 5] = [
        Metric::GpPercent,
        Metric::AvgBasketValue,
        Metric::AvgBasketSize,
        Metric::AvgScriptValue,
        Metric::StockAdjustment,
    ];

    /// Column name, also the canonical wire name
    pub fn column(&self) -> &'static str {
        match self {
            Metric::Turnover => "turnover",
            Metric::GpValue => "gp_value",
            Metric::GpPercent => "gp_percent",
            Metric::CostOfSales => "cost_of_sales",
            Metric::Purchases => "purchases",
            Metric::TransactionCount => "transaction_count",
            Metric::ScriptCount => "script_count",
            Metric::AvgBasketValue => "avg_basket_value",
            Metric::AvgBasketSize => "avg_basket_size",
            Metric::AvgScriptValue => "avg_script_value",
            Metric::DispensaryTurnover => "dispensary_turnover",
            Metric::StockOpening => "stock_opening",
            Metric::StockClosing => "stock_closing",
            Metric::StockAdjustment => "stock_adjustment",
            Metric::SalesCash => "sales_cash",
            Metric::SalesAccount => "sales_account",
            Metric::SalesCod => "sales_cod",
            Metric::TypeRSales => "type_r_sales",
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::GpPercent
            | Metric::AvgBasketValue
            | Metric::AvgBasketSize
            | Metric::AvgScriptValue => MetricKind::Ratio,
            Metric::StockOpening => MetricKind::Opening,
            Metric::StockClosing => MetricKind::Closing,
            _ => MetricKind::Additive,
        }
    }

    pub fn is_derived(&self) -> bool {
        Self::DERIVED.contains(self)
    }

    /// Counts must be whole and non-negative
    pub fn is_count(&self) -> bool {
        matches!(self, Metric::TransactionCount | Metric::ScriptCount)
    }

    /// Resolve a metric from an extractor field name (case-insensitive, with aliases)
    pub fn from_name(name: &str) -> Option<Metric> {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");
        let metric = match normalized.as_str() {
            "turnover" | "total_turnover" => Metric::Turnover,
            "gp_value" | "gross_profit" | "gross_profit_value" => Metric::GpValue,
            "gp_percent" | "gross_profit_percent" | "gp_pct" => Metric::GpPercent,
            "cost_of_sales" => Metric::CostOfSales,
            "purchases" => Metric::Purchases,
            "transaction_count" | "transactions" | "transactions_total" => {
                Metric::TransactionCount
            }
            "script_count" | "scripts" | "script_total" => Metric::ScriptCount,
            "avg_basket_value" => Metric::AvgBasketValue,
            "avg_basket_size" => Metric::AvgBasketSize,
            "avg_script_value" => Metric::AvgScriptValue,
            "dispensary_turnover" | "disp_turnover" => Metric::DispensaryTurnover,
            "stock_opening" | "opening_stock" => Metric::StockOpening,
            "stock_closing" | "closing_stock" => Metric::StockClosing,
            "stock_adjustment" | "adjustments" => Metric::StockAdjustment,
            "sales_cash" | "cash_sales" => Metric::SalesCash,
            "sales_account" | "account_sales" => Metric::SalesAccount,
            "sales_cod" | "cod_sales" => Metric::SalesCod,
            "type_r_sales" => Metric::TypeRSales,
            _ => return None,
        };
        Some(metric)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Metric::from_name(s).ok_or_else(|| format!("unknown metric '{}'", s))
    }
}

/// Sparse set of metric values; absent metrics are simply missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSet(BTreeMap<Metric, Decimal>);

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, metric: Metric) -> Option<Decimal> {
        self.0.get(&metric).copied()
    }

    /// Set or clear a metric
    pub fn set(&mut self, metric: Metric, value: Option<Decimal>) {
        match value {
            Some(v) => {
                self.0.insert(metric, v);
            }
            None => {
                self.0.remove(&metric);
            }
        }
    }

    /// Builder-style insert
    pub fn with(mut self, metric: Metric, value: Decimal) -> Self {
        self.0.insert(metric, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, Decimal)> + '_ {
        self.0.iter().map(|(m, v)| (*m, *v))
    }
}

impl FromIterator<(Metric, Decimal)> for MetricSet {
    fn from_iter<I: IntoIterator<Item = (Metric, Decimal)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Round a stored metric to its column scale
pub fn normalize(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(METRIC_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// Round a ratio or average for storage
pub fn round_ratio(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(RATIO_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// Parse a raw extracted value into a decimal.
///
/// Returns `Ok(None)` for JSON null, `Err` with a reason for anything malformed.
pub fn parse_value(raw: &JsonValue) -> std::result::Result<Option<Decimal>, String> {
    let value = match raw {
        JsonValue::Null => return Ok(None),
        JsonValue::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map_err(|_| format!("number out of range: {}", text))?
        }
        JsonValue::String(s) => match parse_amount(s) {
            Some(v) => v,
            None if s.trim().is_empty() => return Ok(None),
            None => return Err(format!("not a number: {:?}", s)),
        },
        JsonValue::Bool(_) => return Err("boolean is not a number".to_string()),
        JsonValue::Array(_) | JsonValue::Object(_) => {
            return Err("structured value is not a number".to_string())
        }
    };

    if value.abs() >= Decimal::from(METRIC_LIMIT) {
        return Err(format!("value out of range: {}", value));
    }
    Ok(Some(normalize(value)))
}

/// Parse a value for a specific metric, enforcing count rules
pub fn parse_metric_value(
    metric: Metric,
    raw: &JsonValue,
) -> std::result::Result<Option<Decimal>, String> {
    let value = parse_value(raw)?;
    if let Some(v) = value {
        if metric.is_count() && (v.is_sign_negative() || !v.fract().is_zero()) {
            return Err(format!("{} must be a whole non-negative number, got {}", metric, v));
        }
    }
    Ok(value)
}

/// Parse a report-style amount: "R1,234.56", "(100.00)", "12.5%", " 3 400 ".
fn parse_amount(s: &str) -> Option<Decimal> {
    let s = s.trim();

    // Parentheses notation for negatives: (100.00) -> -100.00
    let (is_negative, s) = if s.starts_with('(') && s.ends_with(')') && s.len() > 2 {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };

    let s = s.trim().trim_end_matches('%');
    let (sign, s) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest.trim_start()),
        None => ("", s),
    };
    let s = s.strip_prefix('R').unwrap_or(s);

    // Thousands separators and spacing only; any other character is rejected by the parser
    let cleaned: String = s
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let mut amount = Decimal::from_str(&format!("{}{}", sign, cleaned)).ok()?;
    if is_negative && amount > Decimal::ZERO {
        amount = -amount;
    }
    Some(amount)
}
