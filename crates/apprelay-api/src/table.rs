//! Table rendering for `kubectl get`
//!
//! Produces `meta.k8s.io/v1` Table objects with the columns
//! NAME, READY, AGE and VERSION.

use chrono::{DateTime, Duration, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use serde::Serialize;

use apprelay_common::types::{Application, ApplicationList};

use crate::error::{Error, Operation, Result};

/// Cell value for a missing revision or creation time
const UNKNOWN: &str = "<unknown>";

/// Rendering options (`meta.k8s.io/v1` TableOptions)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableOptions {
    /// Omit the column definitions
    pub no_headers: bool,
}

/// Object a table can be rendered from
#[derive(Clone, Copy, Debug)]
pub enum TableSource<'a> {
    /// A single Application
    Application(&'a Application),
    /// A list of Applications
    List(&'a ApplicationList),
    /// Untyped JSON holding either of the above
    Untyped(&'a serde_json::Value),
}

/// `meta.k8s.io/v1` Table
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Always `meta.k8s.io/v1`
    pub api_version: String,
    /// Always `Table`
    pub kind: String,
    /// Carries the source object's resourceVersion
    pub metadata: ListMeta,
    /// Column headers, empty when `no_headers` is set
    pub column_definitions: Vec<TableColumnDefinition>,
    /// One row per Application
    pub rows: Vec<TableRow>,
}

/// Table column header
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TableColumnDefinition {
    /// Column name
    pub name: String,
    /// OpenAPI type of the cells
    #[serde(rename = "type")]
    pub type_: String,
    /// OpenAPI format of the cells
    pub format: String,
    /// Human-readable description
    pub description: String,
    /// 0 for columns shown by default
    pub priority: i32,
}

/// Table row
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TableRow {
    /// NAME, READY, AGE, VERSION
    pub cells: Vec<serde_json::Value>,
    /// The Application the row was rendered from
    pub object: serde_json::Value,
}

fn column(name: &str, description: &str) -> TableColumnDefinition {
    TableColumnDefinition {
        name: name.to_string(),
        type_: "string".to_string(),
        format: String::new(),
        description: description.to_string(),
        priority: 0,
    }
}

fn columns() -> Vec<TableColumnDefinition> {
    vec![
        column("NAME", "Name of the Application"),
        column("READY", "Ready status of the Application"),
        column("AGE", "Age of the Application"),
        column("VERSION", "Version of the Application"),
    ]
}

/// Render a Table
///
/// `resource` names the addressed resource (`plural.group`) in the
/// NotAcceptable error returned for anything that is not an Application or
/// a list of them.
pub fn render_table(
    source: TableSource<'_>,
    options: TableOptions,
    resource: &str,
    now: DateTime<Utc>,
) -> Result<Table> {
    let (rows, resource_version) = match source {
        TableSource::Application(app) => (
            vec![row(app, now)],
            app.metadata.resource_version.clone(),
        ),
        TableSource::List(list) => (
            list.items.iter().map(|app| row(app, now)).collect(),
            list.metadata.resource_version.clone(),
        ),
        TableSource::Untyped(value) => {
            if !value.is_object() {
                return Err(Error::NotAcceptable {
                    resource: resource.to_string(),
                    message: "object does not implement the Object interfaces".to_string(),
                });
            }
            return if value.get("items").is_some_and(|items| items.is_array()) {
                let list: ApplicationList = serde_json::from_value(value.clone())
                    .map_err(|e| untyped_conversion_error(value, e))?;
                render_table(TableSource::List(&list), options, resource, now)
            } else {
                let app: Application = serde_json::from_value(value.clone())
                    .map_err(|e| untyped_conversion_error(value, e))?;
                render_table(TableSource::Application(&app), options, resource, now)
            };
        }
    };

    Ok(Table {
        api_version: "meta.k8s.io/v1".to_string(),
        kind: "Table".to_string(),
        metadata: ListMeta {
            resource_version,
            ..Default::default()
        },
        column_definitions: if options.no_headers {
            Vec::new()
        } else {
            columns()
        },
        rows,
    })
}

fn untyped_conversion_error(value: &serde_json::Value, err: serde_json::Error) -> Error {
    let name = value
        .pointer("/metadata/name")
        .and_then(|n| n.as_str())
        .unwrap_or_default();
    Error::conversion(
        Operation::ConvertToTable,
        name,
        format!("failed to convert object to Application: {}", err),
    )
}

fn row(app: &Application, now: DateTime<Utc>) -> TableRow {
    let version = if app.status.version.is_empty() {
        UNKNOWN.to_string()
    } else {
        app.status.version.clone()
    };
    let age = app
        .metadata
        .creation_timestamp
        .as_ref()
        .map(|created| human_duration(now.signed_duration_since(created.0)))
        .unwrap_or_else(|| UNKNOWN.to_string());

    TableRow {
        cells: vec![
            app.name().into(),
            app.ready_status().to_string().into(),
            age.into(),
            version.into(),
        ],
        object: serde_json::to_value(app).unwrap_or_default(),
    }
}

/// Kubernetes-style human-readable duration ("45s", "3m20s", "5h", "12d")
///
/// Up to a second of negative skew reads as "0s"; anything more negative is
/// "<invalid>".
pub fn human_duration(d: Duration) -> String {
    let seconds = d.num_seconds();
    if seconds < -1 {
        return "<invalid>".to_string();
    }
    if seconds < 0 {
        return "0s".to_string();
    }
    if seconds < 60 * 2 {
        return format!("{}s", seconds);
    }

    let minutes = d.num_minutes();
    if minutes < 10 {
        let s = seconds % 60;
        if s == 0 {
            return format!("{}m", minutes);
        }
        return format!("{}m{}s", minutes, s);
    }
    if minutes < 60 * 3 {
        return format!("{}m", minutes);
    }

    let hours = d.num_hours();
    if hours < 8 {
        let m = minutes % 60;
        if m == 0 {
            return format!("{}h", hours);
        }
        return format!("{}h{}m", hours, m);
    }
    if hours < 48 {
        return format!("{}h", hours);
    }
    if hours < 24 * 8 {
        let h = hours % 24;
        if h == 0 {
            return format!("{}d", hours / 24);
        }
        return format!("{}d{}h", hours / 24, h);
    }
    if hours < 24 * 365 * 2 {
        return format!("{}d", hours / 24);
    }
    if hours < 24 * 365 * 8 {
        let dy = (hours / 24) % 365;
        if dy == 0 {
            return format!("{}y", hours / 24 / 365);
        }
        return format!("{}y{}d", hours / 24 / 365, dy);
    }
    format!("{}y", hours / 24 / 365)
}
