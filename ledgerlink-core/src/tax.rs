//! Tax categorization and GST computation.
//!
//! Every synced transaction is classified once, at reconciliation time:
//! keyword rules over the lower-cased merchant and description text, then a
//! mapping from the aggregator's raw category. A fixed keyword set flags
//! business expenses, and GST is extracted from GST-inclusive totals for
//! business items outside the personal category.

use crate::domain::TaxCategory;

/// GST rate; totals from the aggregator are GST-inclusive.
pub const GST_RATE: f64 = 0.10;

/// Keyword rules over merchant/description text. First match wins, so more
/// specific merchants come before generic terms.
const KEYWORD_RULES: &[(&str, TaxCategory)] = &[
    // Income
    ("salary", TaxCategory::Income),
    ("payroll", TaxCategory::Income),
    ("invoice payment", TaxCategory::Income),
    ("client payment", TaxCategory::Income),
    // Software and infrastructure
    ("adobe", TaxCategory::Software),
    ("github", TaxCategory::Software),
    ("atlassian", TaxCategory::Software),
    ("jetbrains", TaxCategory::Software),
    ("microsoft 365", TaxCategory::Software),
    ("google workspace", TaxCategory::Software),
    ("aws", TaxCategory::Software),
    ("azure", TaxCategory::Software),
    ("digitalocean", TaxCategory::Software),
    ("godaddy", TaxCategory::Software),
    ("dropbox", TaxCategory::Software),
    ("slack", TaxCategory::Software),
    ("zoom", TaxCategory::Software),
    ("canva", TaxCategory::Software),
    ("xero", TaxCategory::Software),
    // Advertising
    ("google ads", TaxCategory::Advertising),
    ("facebook ads", TaxCategory::Advertising),
    ("linkedin", TaxCategory::Advertising),
    ("mailchimp", TaxCategory::Advertising),
    ("advertising", TaxCategory::Advertising),
    // Professional services
    ("accounting", TaxCategory::Professional),
    ("accountant", TaxCategory::Professional),
    ("legal", TaxCategory::Professional),
    ("lawyer", TaxCategory::Professional),
    ("consulting", TaxCategory::Professional),
    ("bookkeep", TaxCategory::Professional),
    // Bank and merchant fees
    ("bank fee", TaxCategory::BankFees),
    ("account fee", TaxCategory::BankFees),
    ("merchant fee", TaxCategory::BankFees),
    ("stripe", TaxCategory::BankFees),
    ("interest charge", TaxCategory::BankFees),
    // Travel
    ("qantas", TaxCategory::Travel),
    ("virgin australia", TaxCategory::Travel),
    ("uber", TaxCategory::Travel),
    ("taxi", TaxCategory::Travel),
    ("hotel", TaxCategory::Travel),
    ("airbnb", TaxCategory::Travel),
    ("flight", TaxCategory::Travel),
    // Meals
    ("restaurant", TaxCategory::Meals),
    ("cafe", TaxCategory::Meals),
    ("catering", TaxCategory::Meals),
    // Utilities
    ("telstra", TaxCategory::Utilities),
    ("optus", TaxCategory::Utilities),
    ("vodafone", TaxCategory::Utilities),
    ("origin energy", TaxCategory::Utilities),
    ("agl", TaxCategory::Utilities),
    ("electricity", TaxCategory::Utilities),
    ("internet", TaxCategory::Utilities),
    // Office supplies
    ("officeworks", TaxCategory::OfficeSupplies),
    ("stationery", TaxCategory::OfficeSupplies),
    ("office supplies", TaxCategory::OfficeSupplies),
    // Everyday personal spend
    ("woolworths", TaxCategory::Personal),
    ("coles", TaxCategory::Personal),
    ("aldi", TaxCategory::Personal),
    ("iga ", TaxCategory::Personal),
    ("grocery", TaxCategory::Personal),
    ("netflix", TaxCategory::Personal),
    ("spotify", TaxCategory::Personal),
    ("kmart", TaxCategory::Personal),
    ("chemist", TaxCategory::Personal),
    ("medicare", TaxCategory::Personal),
];

/// Aggregator raw category → tax category, applied when no keyword matched.
const CATEGORY_MAP: &[(&str, TaxCategory)] = &[
    ("income", TaxCategory::Income),
    ("bank-fees", TaxCategory::BankFees),
    ("professional-services", TaxCategory::Professional),
    ("software", TaxCategory::Software),
    ("advertising", TaxCategory::Advertising),
    ("travel", TaxCategory::Travel),
    ("food-and-drink", TaxCategory::Meals),
    ("entertainment", TaxCategory::Meals),
    ("utilities", TaxCategory::Utilities),
    ("office", TaxCategory::OfficeSupplies),
    ("groceries", TaxCategory::Personal),
    ("transfer", TaxCategory::Personal),
];

/// Fixed keyword set that flags a business expense when found in the
/// description, merchant name, or category text.
const BUSINESS_KEYWORDS: &[&str] = &[
    "software",
    "subscription",
    "saas",
    "hosting",
    "domain",
    "office",
    "stationery",
    "advertising",
    "marketing",
    "accounting",
    "legal",
    "consulting",
    "coworking",
    "conference",
    "invoice",
    "business",
];

/// Outcome of classifying one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxClassification {
    pub category: TaxCategory,
    pub is_business: bool,
}

/// Classify a transaction from its text fields.
pub fn classify(
    description: &str,
    merchant: Option<&str>,
    raw_category: Option<&str>,
) -> TaxClassification {
    let description = description.to_lowercase();
    let merchant = merchant.map(|m| m.to_lowercase()).unwrap_or_default();
    let raw_category = raw_category.map(|c| c.to_lowercase()).unwrap_or_default();

    let category = keyword_category(&merchant)
        .or_else(|| keyword_category(&description))
        .or_else(|| mapped_category(&raw_category))
        .unwrap_or(TaxCategory::Uncategorized);

    let is_business = BUSINESS_KEYWORDS.iter().any(|kw| {
        description.contains(kw) || merchant.contains(kw) || raw_category.contains(kw)
    });

    TaxClassification {
        category,
        is_business,
    }
}

fn keyword_category(text: &str) -> Option<TaxCategory> {
    if text.is_empty() {
        return None;
    }
    KEYWORD_RULES
        .iter()
        .find(|(kw, _)| text.contains(kw))
        .map(|&(_, cat)| cat)
}

fn mapped_category(raw: &str) -> Option<TaxCategory> {
    CATEGORY_MAP
        .iter()
        .find(|(name, _)| *name == raw)
        .map(|&(_, cat)| cat)
}

/// GST embedded in a GST-inclusive total, rounded to cents.
pub fn gst_component(amount: f64) -> f64 {
    let gst = amount.abs() * (GST_RATE / (1.0 + GST_RATE));
    (gst * 100.0).round() / 100.0
}

/// Whether a classified transaction attracts a GST figure: business-flagged
/// and outside the personal category.
pub fn gst_applies(classification: &TaxClassification) -> bool {
    classification.is_business && classification.category != TaxCategory::Personal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gst_on_110_inclusive_is_exactly_10() {
        assert_eq!(gst_component(110.0), 10.0);
    }

    #[test]
    fn gst_rounds_to_cents() {
        assert_eq!(gst_component(100.0), 9.09);
        assert_eq!(gst_component(-55.0), 5.0);
        assert_eq!(gst_component(1.0), 0.09);
    }

    #[test]
    fn merchant_keywords_win_over_raw_category() {
        let c = classify("monthly plan", Some("GitHub"), Some("entertainment"));
        assert_eq!(c.category, TaxCategory::Software);
    }

    #[test]
    fn raw_category_mapping_applies_when_no_keyword_matches() {
        let c = classify("POS 1234", None, Some("bank-fees"));
        assert_eq!(c.category, TaxCategory::BankFees);
    }

    #[test]
    fn unknown_text_is_uncategorized_and_not_business() {
        let c = classify("???", None, None);
        assert_eq!(c.category, TaxCategory::Uncategorized);
        assert!(!c.is_business);
    }

    #[test]
    fn business_flag_from_description_keywords() {
        let c = classify("Adobe subscription renewal", Some("Adobe"), None);
        assert_eq!(c.category, TaxCategory::Software);
        assert!(c.is_business);
        assert!(gst_applies(&c));
    }

    #[test]
    fn groceries_are_personal_and_never_attract_gst() {
        let c = classify("WOOLWORTHS 1234 SYDNEY", Some("Woolworths"), Some("groceries"));
        assert_eq!(c.category, TaxCategory::Personal);
        assert!(!gst_applies(&c));
    }

    #[test]
    fn business_keyword_with_personal_category_still_skips_gst() {
        // "business" in the description flags it, but the personal category
        // keeps GST off.
        let c = classify("business lunch groceries", Some("Coles"), None);
        assert_eq!(c.category, TaxCategory::Personal);
        assert!(c.is_business);
        assert!(!gst_applies(&c));
    }

    #[test]
    fn classification_is_case_insensitive() {
        let lower = classify("qantas flight", None, None);
        let upper = classify("QANTAS FLIGHT", None, None);
        assert_eq!(lower, upper);
        assert_eq!(lower.category, TaxCategory::Travel);
    }
}
