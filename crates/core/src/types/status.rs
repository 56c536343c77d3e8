//! Status enums for orders and checkout.

use serde::{Deserialize, Serialize};

/// Order status as tracked by the shop operators.
///
/// The server stores the operator-facing label verbatim, so the wire values
/// are the Russian labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Being picked and packed.
    #[default]
    #[serde(rename = "В сборке")]
    Assembling,
    /// Waiting for the customer to pay.
    #[serde(rename = "Ожидает оплату")]
    AwaitingPayment,
    /// Handed to the carrier.
    #[serde(rename = "В пути")]
    InTransit,
    /// Received by the customer.
    #[serde(rename = "Доставлен")]
    Delivered,
    /// Cancelled by the shop or the customer.
    #[serde(rename = "Отменен")]
    Cancelled,
}

impl OrderStatus {
    /// Operator-facing label (identical to the wire value).
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Assembling => "В сборке",
            Self::AwaitingPayment => "Ожидает оплату",
            Self::InTransit => "В пути",
            Self::Delivered => "Доставлен",
            Self::Cancelled => "Отменен",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Delivery method chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    /// Avito delivery.
    #[default]
    Avito,
    /// Yandex Delivery.
    Yandex,
    /// Ozon pickup points.
    Ozon,
    /// 5Post parcel lockers.
    #[serde(rename = "5post")]
    FivePost,
}

impl DeliveryMethod {
    /// All methods, in the order they are offered.
    pub const ALL: [Self; 4] = [Self::Avito, Self::Yandex, Self::Ozon, Self::FivePost];

    /// Customer-facing label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Avito => "Авито доставка",
            Self::Yandex => "Яндекс Доставка",
            Self::Ozon => "Ozon",
            Self::FivePost => "5Post",
        }
    }
}

impl std::fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Avito => write!(f, "avito"),
            Self::Yandex => write!(f, "yandex"),
            Self::Ozon => write!(f, "ozon"),
            Self::FivePost => write!(f, "5post"),
        }
    }
}

impl std::str::FromStr for DeliveryMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avito" => Ok(Self::Avito),
            "yandex" => Ok(Self::Yandex),
            "ozon" => Ok(Self::Ozon),
            "5post" | "fivepost" => Ok(Self::FivePost),
            other => Err(format!("invalid delivery method: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_method_wire_values() {
        for method in DeliveryMethod::ALL {
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{method}\""));
            assert_eq!(method.to_string().parse::<DeliveryMethod>(), Ok(method));
        }
    }

    #[test]
    fn test_order_status_wire_values() {
        let status: OrderStatus = serde_json::from_str("\"В пути\"").unwrap();
        assert_eq!(status, OrderStatus::InTransit);
        assert_eq!(
            serde_json::to_string(&OrderStatus::Assembling).unwrap(),
            "\"В сборке\""
        );
    }
}
