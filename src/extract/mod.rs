// src/extract/mod.rs
//
// Heuristic table extraction from decoded filing fragments. The layouts
// here are brittle by nature: the engine either recognizes a layout or
// fails loudly for that statement, it never guesses.

pub mod fragment;
pub mod normalize;
pub mod shares;
pub mod table;

use crate::registry::StatementKind;

/// Amount unit declared inside a statement table. Filings mark the unit in
/// free text near the table, with a handful of known phrasings per unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    ThousandsOfYen,
    MillionsOfYen,
}

impl Unit {
    pub fn markers(&self) -> &'static [&'static str] {
        match self {
            Unit::ThousandsOfYen => {
                &["単位：千円", "単位:千円", "単位　千円", "金額（千円）", "（千万円）"]
            }
            Unit::MillionsOfYen => {
                &["単位：百万円", "単位:百万円", "単位　百万円", "金額（百万円）", "（百万円）"]
            }
        }
    }

    pub fn scale(&self) -> i64 {
        match self {
            Unit::ThousandsOfYen => 1_000,
            Unit::MillionsOfYen => 1_000_000,
        }
    }
}

/// Fragment keywords tried per statement kind, in priority order. These are
/// XBRL text-block element names carried on the `name` attribute.
pub fn statement_keywords(kind: StatementKind) -> &'static [&'static str] {
    match kind {
        StatementKind::BalanceSheet => &[
            "jpcrp_cor:ConsolidatedBalanceSheetTextBlock",
            "jpcrp_cor:BalanceSheetTextBlock",
            "jpigp_cor:ConsolidatedStatementOfFinancialPositionIFRSTextBlock",
        ],
        StatementKind::IncomeStatement => &[
            "jpcrp_cor:ConsolidatedStatementOfIncomeTextBlock",
            "jpcrp_cor:StatementOfIncomeTextBlock",
            "jpigp_cor:ConsolidatedStatementOfProfitOrLossIFRSTextBlock",
        ],
        StatementKind::ShareCount => &["jpcrp_cor:IssuedSharesTotalNumberOfSharesEtcTextBlock"],
    }
}
