//! Canonical symbol representation and exchange symbol normalization
//!
//! Builds forward and reverse lookup tables between canonical symbols and
//! the exchange's native instrument strings, from instrument metadata
//! fetched once at startup.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Instrument type of a canonical symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentType {
    Spot,
    Perpetual,
    Future,
    Option,
}

/// Call/put flag for option instruments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

/// Canonical, exchange-independent instrument identifier.
///
/// The normalized string form is a deterministic function of the fields;
/// the exchange-native string is recovered through [`SymbolMap`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub base: String,
    pub quote: String,
    pub instrument_type: InstrumentType,
    /// Expiry in the exchange's YYMMDD form, futures and options only
    pub expiry: Option<String>,
    pub option_type: Option<OptionType>,
    pub strike: Option<Decimal>,
}

impl Symbol {
    pub fn spot(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
            instrument_type: InstrumentType::Spot,
            expiry: None,
            option_type: None,
            strike: None,
        }
    }

    pub fn perpetual(base: &str, quote: &str) -> Self {
        Self {
            instrument_type: InstrumentType::Perpetual,
            ..Self::spot(base, quote)
        }
    }

    /// Render the canonical string form.
    pub fn normalized(&self) -> String {
        match self.instrument_type {
            InstrumentType::Spot => format!("{}-{}", self.base, self.quote),
            InstrumentType::Perpetual => format!("{}-{}-PERP", self.base, self.quote),
            InstrumentType::Future => format!(
                "{}-{}-{}",
                self.base,
                self.quote,
                self.expiry.as_deref().unwrap_or("")
            ),
            InstrumentType::Option => format!(
                "{}-{}-{}-{}-{}",
                self.base,
                self.quote,
                self.expiry.as_deref().unwrap_or(""),
                self.strike.map(|s| s.to_string()).unwrap_or_default(),
                match self.option_type {
                    Some(OptionType::Call) => "C",
                    Some(OptionType::Put) => "P",
                    None => "",
                },
            ),
        }
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.normalized())
    }
}

/// One record of the exchange's instrument metadata.
///
/// Fields the exchange may omit are optional; records missing required
/// fields are skipped at map-build time rather than failing the load.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentRecord {
    /// Native instrument string, e.g. "BTC_USDT" or "BTC_USDT.PERP"
    pub symbol: Option<String>,
    pub base_currency: Option<String>,
    pub quote_currency: Option<String>,
    /// "SPOT" or "PERP"
    #[serde(rename = "type")]
    pub instrument_type: Option<String>,
    /// Decimal places of the quote price; tick size is 10^-n
    pub quote_precision: Option<u32>,
}

/// Instrument metadata REST response envelope
#[derive(Debug, Deserialize)]
pub struct SymbolsResponse {
    pub data: SymbolsData,
}

#[derive(Debug, Deserialize)]
pub struct SymbolsData {
    pub symbols: Vec<InstrumentRecord>,
}

/// Per-symbol instrument attributes kept alongside the lookup tables
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentInfo {
    pub native: String,
    pub instrument_type: InstrumentType,
    pub tick_size: Option<Decimal>,
}

/// Forward and reverse symbol lookup tables for one exchange session.
///
/// Built once from instrument metadata and read-only afterwards.
#[derive(Debug, Default, PartialEq)]
pub struct SymbolMap {
    to_native: HashMap<String, String>,
    to_canonical: HashMap<String, String>,
    info: HashMap<String, InstrumentInfo>,
}

impl SymbolMap {
    /// Build the lookup tables from raw instrument metadata.
    ///
    /// Pure and idempotent: the same records always produce the same maps.
    /// Records missing a native symbol, base, or quote are skipped.
    pub fn from_instruments(records: &[InstrumentRecord]) -> Self {
        let mut map = SymbolMap::default();

        for record in records {
            let (native, base, quote) = match (
                record.symbol.as_deref(),
                record.base_currency.as_deref(),
                record.quote_currency.as_deref(),
            ) {
                (Some(n), Some(b), Some(q)) => (n, b, q),
                _ => {
                    debug!(record = ?record, "Skipping instrument record with missing fields");
                    continue;
                }
            };

            let instrument_type = match record.instrument_type.as_deref() {
                Some("PERP") | Some("SWAP") => InstrumentType::Perpetual,
                _ if native.ends_with(".PERP") => InstrumentType::Perpetual,
                _ => InstrumentType::Spot,
            };

            let symbol = match instrument_type {
                InstrumentType::Perpetual => Symbol::perpetual(base, quote),
                _ => Symbol::spot(base, quote),
            };
            let canonical = symbol.normalized();

            map.to_native.insert(canonical.clone(), native.to_string());
            map.to_canonical.insert(native.to_string(), canonical.clone());
            map.info.insert(
                canonical,
                InstrumentInfo {
                    native: native.to_string(),
                    instrument_type,
                    tick_size: record.quote_precision.map(|p| Decimal::new(1, p)),
                },
            );
        }

        map
    }

    /// Canonical symbol for an exchange-native instrument string
    pub fn canonical_for(&self, native: &str) -> Option<&str> {
        self.to_canonical.get(native).map(String::as_str)
    }

    /// Exchange-native instrument string for a canonical symbol
    pub fn native_for(&self, canonical: &str) -> Option<&str> {
        self.to_native.get(canonical).map(String::as_str)
    }

    /// Instrument attributes for a canonical symbol
    pub fn info_for(&self, canonical: &str) -> Option<&InstrumentInfo> {
        self.info.get(canonical)
    }

    pub fn len(&self) -> usize {
        self.to_native.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_native.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(symbol: &str, base: &str, quote: &str, kind: Option<&str>) -> InstrumentRecord {
        InstrumentRecord {
            symbol: Some(symbol.to_string()),
            base_currency: Some(base.to_string()),
            quote_currency: Some(quote.to_string()),
            instrument_type: kind.map(str::to_string),
            quote_precision: Some(2),
        }
    }

    #[test]
    fn test_round_trip_mapping() {
        let records = vec![
            record("BTC_USDT", "BTC", "USDT", Some("SPOT")),
            record("ETH_USDT", "ETH", "USDT", Some("SPOT")),
            record("BTC_USDT.PERP", "BTC", "USDT", Some("PERP")),
        ];
        let map = SymbolMap::from_instruments(&records);

        assert_eq!(map.len(), 3);
        for canonical in ["BTC-USDT", "ETH-USDT", "BTC-USDT-PERP"] {
            let native = map.native_for(canonical).unwrap();
            assert_eq!(map.canonical_for(native), Some(canonical));
        }
        assert_eq!(map.native_for("BTC-USDT-PERP"), Some("BTC_USDT.PERP"));
    }

    #[test]
    fn test_malformed_record_skipped() {
        let records = vec![
            record("BTC_USDT", "BTC", "USDT", None),
            InstrumentRecord {
                symbol: Some("BROKEN".to_string()),
                base_currency: None,
                quote_currency: Some("USDT".to_string()),
                instrument_type: None,
                quote_precision: None,
            },
        ];
        let map = SymbolMap::from_instruments(&records);

        assert_eq!(map.len(), 1);
        assert!(map.canonical_for("BROKEN").is_none());
        assert_eq!(map.canonical_for("BTC_USDT"), Some("BTC-USDT"));
    }

    #[test]
    fn test_build_is_idempotent() {
        let records = vec![
            record("BTC_USDT", "BTC", "USDT", Some("SPOT")),
            record("ETH_USDT", "ETH", "USDT", Some("SPOT")),
        ];
        assert_eq!(
            SymbolMap::from_instruments(&records),
            SymbolMap::from_instruments(&records)
        );
    }

    #[test]
    fn test_instrument_info() {
        let records = vec![record("BTC_USDT", "BTC", "USDT", Some("SPOT"))];
        let map = SymbolMap::from_instruments(&records);

        let info = map.info_for("BTC-USDT").unwrap();
        assert_eq!(info.native, "BTC_USDT");
        assert_eq!(info.instrument_type, InstrumentType::Spot);
        assert_eq!(info.tick_size, Some(dec!(0.01)));
    }

    #[test]
    fn test_normalized_forms() {
        assert_eq!(Symbol::spot("btc", "usdt").normalized(), "BTC-USDT");
        assert_eq!(Symbol::perpetual("BTC", "USDT").normalized(), "BTC-USDT-PERP");

        let option = Symbol {
            base: "BTC".to_string(),
            quote: "USD".to_string(),
            instrument_type: InstrumentType::Option,
            expiry: Some("240628".to_string()),
            option_type: Some(OptionType::Call),
            strike: Some(dec!(50000)),
        };
        assert_eq!(option.normalized(), "BTC-USD-240628-50000-C");
    }
}
