use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Maps an operation name onto an HTTP method and path template.
/// `{id}` in the path is filled from the `id` parameter.
#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub operation: &'static str,
    pub method: Method,
    pub path: &'static str,
}

const ROUTES: &[Route] = &[
    Route { operation: "balance.retrieve", method: Method::Get, path: "/v1/balance" },
    Route { operation: "customers.list", method: Method::Get, path: "/v1/customers" },
    Route { operation: "customers.retrieve", method: Method::Get, path: "/v1/customers/{id}" },
    Route { operation: "customers.create", method: Method::Post, path: "/v1/customers" },
    Route { operation: "invoices.list", method: Method::Get, path: "/v1/invoices" },
    Route { operation: "invoices.retrieve", method: Method::Get, path: "/v1/invoices/{id}" },
    Route { operation: "invoices.create", method: Method::Post, path: "/v1/invoices" },
    Route { operation: "invoices.send", method: Method::Post, path: "/v1/invoices/{id}/send" },
    Route { operation: "invoiceitems.create", method: Method::Post, path: "/v1/invoiceitems" },
    Route { operation: "payment_intents.list", method: Method::Get, path: "/v1/payment_intents" },
    Route { operation: "payment_links.create", method: Method::Post, path: "/v1/payment_links" },
    Route { operation: "payouts.list", method: Method::Get, path: "/v1/payouts" },
    Route { operation: "prices.create", method: Method::Post, path: "/v1/prices" },
];

pub fn route(operation: &str) -> Option<&'static Route> {
    ROUTES.iter().find(|r| r.operation == operation)
}

pub fn operations() -> impl Iterator<Item = &'static str> {
    ROUTES.iter().map(|r| r.operation)
}

impl Route {
    /// Expand the path template. The `id` parameter is consumed when the
    /// template uses it; the remaining parameters are returned.
    pub fn resolve(&self, params: &Value) -> Result<(String, Value), String> {
        let mut rest: Map<String, Value> = params.as_object().cloned().unwrap_or_default();
        if !self.path.contains("{id}") {
            return Ok((self.path.to_string(), Value::Object(rest)));
        }

        let id = match rest.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => return Err(format!("operation '{}' needs an 'id'", self.operation)),
        };
        let path = self.path.replace("{id}", &urlencoding::encode(&id));
        Ok((path, Value::Object(rest)))
    }
}
