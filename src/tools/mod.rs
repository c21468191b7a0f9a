//! Built-in tools.
//!
//! | Tool | Input | Notes |
//! |------|-------|-------|
//! | `weather` | `location`, `unit?` | mock report |
//! | `qrcode` | `text` | image link from a public QR service |
//! | `customer` | `customerId`, `creditStatus?` | `Incomplete` for credit ids without a status |

pub mod customer;
pub mod qrcode;
pub mod weather;

pub use customer::{CreditStatus, CustomerTool};
pub use qrcode::QrCodeTool;
pub use weather::{TemperatureUnit, WeatherTool};

use crate::registry::{ToolDefinition, ToolHandler, ToolRegistry};
use crate::Result;
use std::sync::Arc;

/// The closed set of tools shipped with the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinTool {
    Weather,
    QrCode,
    Customer,
}

impl BuiltinTool {
    /// Registration order.
    pub const ALL: [BuiltinTool; 3] = [BuiltinTool::Weather, BuiltinTool::QrCode, BuiltinTool::Customer];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinTool::Weather => weather::NAME,
            BuiltinTool::QrCode => qrcode::NAME,
            BuiltinTool::Customer => customer::NAME,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    pub fn definition(&self) -> Result<ToolDefinition> {
        let (description, schema, handler): (&str, _, Arc<dyn ToolHandler>) = match self {
            BuiltinTool::Weather => (weather::DESCRIPTION, weather::schema(), Arc::new(WeatherTool)),
            BuiltinTool::QrCode => (qrcode::DESCRIPTION, qrcode::schema(), Arc::new(QrCodeTool)),
            BuiltinTool::Customer => (
                customer::DESCRIPTION,
                customer::schema(),
                Arc::new(CustomerTool::new()),
            ),
        };
        Ok(ToolDefinition::new(self.name(), description, schema, handler)?)
    }
}

/// Registry holding every built-in tool.
pub fn builtin_registry() -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in BuiltinTool::ALL {
        registry.register(tool.definition()?)?;
    }
    Ok(registry)
}

/// Like [`builtin_registry`], with the customer tool replaced (e.g. a fixed clock).
pub fn builtin_registry_with_customer(customer: CustomerTool) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in BuiltinTool::ALL {
        let definition = match tool {
            BuiltinTool::Customer => ToolDefinition::new(
                customer::NAME,
                customer::DESCRIPTION,
                customer::schema(),
                Arc::new(customer.clone()),
            )?,
            other => other.definition()?,
        };
        registry.register(definition)?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_register_in_order() {
        let registry = builtin_registry().unwrap();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["weather", "qrcode", "customer"]);
    }

    #[test]
    fn names_round_trip() {
        for tool in BuiltinTool::ALL {
            assert_eq!(BuiltinTool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(BuiltinTool::from_name("calendar"), None);
    }
}
