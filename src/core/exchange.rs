use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Listing venue of a position, used to derive the provider symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Exchange {
    Nyse,
    Nasdaq,
    HongKong,
    Paris,
    London,
    Toronto,
    TsxVenture,
    Xetra,
}

impl Exchange {
    /// Provider symbol for `ticker` listed on this exchange.
    ///
    /// A dotted share class such as `CTC.A` takes the provider's dash form,
    /// giving `CTC-A.TO` on TSE.
    pub fn provider_symbol(&self, ticker: &str) -> String {
        let ticker = ticker.replace('.', "-");
        match self {
            Exchange::Nyse | Exchange::Nasdaq => ticker,
            Exchange::HongKong => format!("{ticker}.HK"),
            Exchange::Paris => format!("{ticker}.PA"),
            Exchange::London => format!("{ticker}.L"),
            Exchange::Toronto => format!("{ticker}.TO"),
            Exchange::TsxVenture => format!("{ticker}.V"),
            Exchange::Xetra => format!("{ticker}.DE"),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Exchange::Nyse => "NYSE",
            Exchange::Nasdaq => "NASDAQ",
            Exchange::HongKong => "HKG",
            Exchange::Paris => "EPA",
            Exchange::London => "LON",
            Exchange::Toronto => "TSE",
            Exchange::TsxVenture => "CVE",
            Exchange::Xetra => "XETRA",
        }
    }
}

impl Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Exchange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NYSE" => Ok(Exchange::Nyse),
            "NASDAQ" => Ok(Exchange::Nasdaq),
            "HKG" | "HKEX" => Ok(Exchange::HongKong),
            "EPA" => Ok(Exchange::Paris),
            "LON" | "LSE" => Ok(Exchange::London),
            "TSE" | "TSX" => Ok(Exchange::Toronto),
            "CVE" => Ok(Exchange::TsxVenture),
            "XETRA" | "ETR" => Ok(Exchange::Xetra),
            _ => Err(anyhow::anyhow!("Unknown exchange: {}", s)),
        }
    }
}

impl TryFrom<String> for Exchange {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Exchange> for String {
    fn from(value: Exchange) -> Self {
        value.code().to_string()
    }
}
