//! Helpers mapping CODAP document operations onto requests.
//!
//! Every function takes the connection explicitly and holds no state of
//! its own. Names are validated by [`ResourceSelector`], so a name
//! containing `[`, `]` or `.` fails before anything is sent.

use crate::dispatch::{ActionSpec, Subscription};
use crate::{ClientError, Connection, HandlerError};
use gogodata_core::{
    AttributeSpec, DataContextSpec, Dimensions, FrameConfig, HostRequest, Request, ResourceSelector,
    Response,
};
use serde::Serialize;
use serde_json::{json, Value};

/// The host's token for "no parent collection".
pub const ROOT_COLLECTION: &str = "_root_";

/// Tries `name`, `name1` ... `name100` before giving up.
pub const MAX_UNIQUE_NAME_ATTEMPTS: u32 = 100;

type Result<T> = std::result::Result<T, ClientError>;

fn ctx(context: &str) -> Result<ResourceSelector> {
    Ok(ResourceSelector::data_context(context)?)
}

fn coll(context: &str, collection: &str) -> Result<ResourceSelector> {
    Ok(ctx(context)?.child("collection", collection)?)
}

async fn send(conn: &Connection, request: Request) -> Result<Response> {
    conn.send_request(&request).await
}

fn to_values(values: &impl Serialize) -> Result<Value> {
    Ok(serde_json::to_value(values)?)
}

// Plugin and components

/// Initialize the connection with a minimal frame config.
pub async fn initialize_plugin(
    conn: &Connection,
    name: &str,
    version: &str,
    dimensions: Dimensions,
) -> Result<Option<Value>> {
    let mut config = FrameConfig::new(name);
    config.version = Some(version.to_string());
    config.dimensions = Some(dimensions);
    conn.init(config).await
}

/// Open a case table for a data context.
pub async fn create_table(
    conn: &Connection,
    data_context: &str,
    dataset_name: Option<&str>,
) -> Result<Response> {
    let mut values = json!({ "type": "caseTable", "dataContext": data_context });
    if let Some(name) = dataset_name {
        values["name"] = json!(name);
    }
    send(conn, Request::create(ResourceSelector::leaf("component")?, values)).await
}

/// Bring the plugin's own component to the front.
pub async fn select_self(conn: &Connection) -> Result<Response> {
    let frame = send(conn, Request::get(ResourceSelector::leaf("interactiveFrame")?)).await?;
    if !frame.success {
        return Ok(frame);
    }
    let id = match frame.value("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Ok(Response::failed()),
    };
    let result = send(
        conn,
        Request::notify(
            ResourceSelector::named("component", id)?,
            json!({ "request": "select" }),
        ),
    )
    .await?;
    if !result.success {
        tracing::warn!("selectSelf failed");
    }
    Ok(result)
}

pub fn add_component_listener<F>(conn: &Connection, handler: F)
where
    F: Fn(&HostRequest) -> std::result::Result<Response, HandlerError> + Send + Sync + 'static,
{
    conn.on(ActionSpec::Notify, "component", handler);
}

// Data contexts

pub async fn get_list_of_data_contexts(conn: &Connection) -> Result<Response> {
    send(conn, Request::get(ResourceSelector::leaf("dataContextList")?)).await
}

pub async fn get_data_context(conn: &Connection, context: &str) -> Result<Response> {
    send(conn, Request::get(ctx(context)?)).await
}

pub async fn create_data_context(conn: &Connection, context: &str) -> Result<Response> {
    send(
        conn,
        Request::create(ResourceSelector::leaf("dataContext")?, json!({ "name": context })),
    )
    .await
}

/// Create a data context with its collections and attributes.
pub async fn create_data_context_with(conn: &Connection, spec: &DataContextSpec) -> Result<Response> {
    send(
        conn,
        Request::create(ResourceSelector::leaf("dataContext")?, to_values(spec)?),
    )
    .await
}

pub async fn create_data_context_from_url(conn: &Connection, url: &str) -> Result<Response> {
    send(
        conn,
        Request::create(ResourceSelector::leaf("dataContextFromURL")?, json!({ "URL": url })),
    )
    .await
}

pub fn add_data_contexts_list_listener<F>(conn: &Connection, handler: F)
where
    F: Fn(&HostRequest) -> std::result::Result<Response, HandlerError> + Send + Sync + 'static,
{
    conn.on(ActionSpec::Notify, "documentChangeNotice", handler);
}

pub fn add_data_context_change_listener<F>(conn: &Connection, context: &str, handler: F) -> Result<()>
where
    F: Fn(&HostRequest) -> std::result::Result<Response, HandlerError> + Send + Sync + 'static,
{
    let resource = ResourceSelector::named("dataContextChangeNotice", context)?;
    conn.subscribe(Subscription::new(ActionSpec::Notify, resource, handler));
    Ok(())
}

// Collections

pub async fn get_collection_list(conn: &Connection, context: &str) -> Result<Response> {
    send(conn, Request::get(ctx(context)?.then("collectionList")?)).await
}

pub async fn get_collection(conn: &Connection, context: &str, collection: &str) -> Result<Response> {
    send(conn, Request::get(coll(context, collection)?)).await
}

fn collection_values(name: &str, parent: Option<&str>, attrs: Option<&[AttributeSpec]>) -> Result<Value> {
    let mut values = json!({ "name": name, "title": name });
    if let Some(parent) = parent {
        values["parent"] = json!(parent);
    }
    if let Some(attrs) = attrs {
        values["attrs"] = to_values(&attrs)?;
    }
    Ok(values)
}

/// Create a collection at the top of the hierarchy.
pub async fn create_parent_collection(
    conn: &Connection,
    context: &str,
    collection: &str,
    attrs: Option<&[AttributeSpec]>,
) -> Result<Response> {
    let values = collection_values(collection, Some(ROOT_COLLECTION), attrs)?;
    send(conn, Request::create(ctx(context)?.then("collection")?, values)).await
}

pub async fn create_child_collection(
    conn: &Connection,
    context: &str,
    collection: &str,
    parent: &str,
    attrs: Option<&[AttributeSpec]>,
) -> Result<Response> {
    let values = collection_values(collection, Some(parent), attrs)?;
    send(conn, Request::create(ctx(context)?.then("collection")?, values)).await
}

/// Create a collection wherever the host puts new collections.
pub async fn create_new_collection(
    conn: &Connection,
    context: &str,
    collection: &str,
    attrs: Option<&[AttributeSpec]>,
) -> Result<Response> {
    let values = collection_values(collection, None, attrs)?;
    send(conn, Request::create(ctx(context)?.then("collection")?, values)).await
}

/// Find a collection name not yet used in `context`.
///
/// Tries `name` (for index 0) and then `name1`, `name2`, ... by asking the
/// host for each candidate. Returns `None` once the index passes
/// [`MAX_UNIQUE_NAME_ATTEMPTS`].
pub async fn ensure_unique_collection_name(
    conn: &Connection,
    context: &str,
    name: &str,
    index: u32,
) -> Result<Option<String>> {
    let mut index = index;
    loop {
        let candidate = if index == 0 {
            name.to_string()
        } else {
            format!("{name}{index}")
        };
        let existing = send(conn, Request::get(coll(context, &candidate)?)).await?;
        if !existing.success {
            return Ok(Some(candidate));
        }
        if index >= MAX_UNIQUE_NAME_ATTEMPTS {
            tracing::warn!("No free collection name for {} in {}", name, context);
            return Ok(None);
        }
        index += 1;
    }
}

/// Move an attribute into a new collection of its own under `parent`.
///
/// Collections cannot be re-parented, so a fresh collection is created
/// (under a unique temporary name when the move would empty a same-named
/// collection) and the attribute is relocated into it. `parent` may be
/// `"root"`.
///
/// Returns `None` when no unique name could be found, otherwise the reply
/// to the last request sent.
pub async fn create_collection_from_attribute(
    conn: &Connection,
    context: &str,
    old_collection: &str,
    attribute: &str,
    parent: &str,
) -> Result<Option<Response>> {
    let existing = get_collection(conn, context, attribute).await?;
    let single_attr = existing
        .value("attrs")
        .and_then(Value::as_array)
        .is_some_and(|attrs| attrs.len() == 1);
    let will_be_emptied = existing.success && (single_attr || attribute == old_collection);

    let new_name = if will_be_emptied {
        match ensure_unique_collection_name(conn, context, attribute, 0).await? {
            Some(name) => name,
            None => return Ok(None),
        }
    } else {
        attribute.to_string()
    };

    let parent = if parent == "root" { ROOT_COLLECTION } else { parent };
    let created = create_child_collection(conn, context, &new_name, parent, None).await?;
    if !created.success {
        tracing::warn!(
            "Could not create collection {} in {}: {}",
            new_name,
            context,
            created.error_message().unwrap_or("unknown failure")
        );
        return Ok(Some(created));
    }

    let moved = send(
        conn,
        Request::update(
            coll(context, old_collection)?.child("attributeLocation", attribute)?,
            json!({ "collection": new_name, "position": 0 }),
        ),
    )
    .await?;
    Ok(Some(moved))
}

// Attributes

pub async fn get_attribute(
    conn: &Connection,
    context: &str,
    collection: &str,
    attribute: &str,
) -> Result<Response> {
    send(conn, Request::get(coll(context, collection)?.child("attribute", attribute)?)).await
}

pub async fn get_attribute_list(conn: &Connection, context: &str, collection: &str) -> Result<Response> {
    send(conn, Request::get(coll(context, collection)?.then("attributeList")?)).await
}

pub async fn create_new_attribute(
    conn: &Connection,
    context: &str,
    collection: &str,
    attribute: &str,
) -> Result<Response> {
    send(
        conn,
        Request::create(
            coll(context, collection)?.then("attribute")?,
            json!({ "name": attribute, "title": attribute }),
        ),
    )
    .await
}

pub async fn update_attribute(
    conn: &Connection,
    context: &str,
    collection: &str,
    attribute: &str,
    values: Value,
) -> Result<Response> {
    send(
        conn,
        Request::update(coll(context, collection)?.child("attribute", attribute)?, values),
    )
    .await
}

pub async fn update_attribute_position(
    conn: &Connection,
    context: &str,
    collection: &str,
    attribute: &str,
    position: u32,
) -> Result<Response> {
    send(
        conn,
        Request::update(
            coll(context, collection)?.child("attributeLocation", attribute)?,
            json!({ "collection": collection, "position": position }),
        ),
    )
    .await
}

// Cases

pub async fn get_case_count(conn: &Connection, context: &str, collection: &str) -> Result<Response> {
    send(conn, Request::get(coll(context, collection)?.then("caseCount")?)).await
}

pub async fn get_case_by_index(
    conn: &Connection,
    context: &str,
    collection: &str,
    index: u64,
) -> Result<Response> {
    send(
        conn,
        Request::get(coll(context, collection)?.child("caseByIndex", index.to_string())?),
    )
    .await
}

pub async fn get_case_by_id(conn: &Connection, context: &str, case_id: u64) -> Result<Response> {
    send(conn, Request::get(ctx(context)?.child("caseByID", case_id.to_string())?)).await
}

pub async fn get_case_by_search(
    conn: &Connection,
    context: &str,
    collection: &str,
    search: &str,
) -> Result<Response> {
    send(conn, Request::get(coll(context, collection)?.child("caseSearch", search)?)).await
}

pub async fn get_case_by_formula_search(
    conn: &Connection,
    context: &str,
    collection: &str,
    search: &str,
) -> Result<Response> {
    send(
        conn,
        Request::get(coll(context, collection)?.child("caseFormulaSearch", search)?),
    )
    .await
}

pub async fn create_single_or_parent_case(
    conn: &Connection,
    context: &str,
    collection: &str,
    values: Value,
) -> Result<Response> {
    send(conn, Request::create(coll(context, collection)?.then("case")?, values)).await
}

pub async fn create_child_case(
    conn: &Connection,
    context: &str,
    collection: &str,
    parent_case_id: u64,
    values: Value,
) -> Result<Response> {
    send(
        conn,
        Request::create(
            coll(context, collection)?.then("case")?,
            json!([{ "parent": parent_case_id, "values": values }]),
        ),
    )
    .await
}

pub async fn update_case_by_id(
    conn: &Connection,
    context: &str,
    case_id: u64,
    values: Value,
) -> Result<Response> {
    send(
        conn,
        Request::update(
            ctx(context)?.child("caseByID", case_id.to_string())?,
            json!({ "values": values }),
        ),
    )
    .await
}

pub async fn update_cases(
    conn: &Connection,
    context: &str,
    collection: &str,
    values: Value,
) -> Result<Response> {
    send(conn, Request::update(coll(context, collection)?.then("case")?, values)).await
}

// Selection

pub async fn get_selection_list(conn: &Connection, context: &str) -> Result<Response> {
    send(conn, Request::get(ctx(context)?.then("selectionList")?)).await
}

/// Replace the selection with `case_ids`.
pub async fn select_cases(conn: &Connection, context: &str, case_ids: &[u64]) -> Result<Response> {
    send(
        conn,
        Request::create(ctx(context)?.then("selectionList")?, json!(case_ids)),
    )
    .await
}

pub async fn add_cases_to_selection(
    conn: &Connection,
    context: &str,
    case_ids: &[u64],
) -> Result<Response> {
    send(
        conn,
        Request::update(ctx(context)?.then("selectionList")?, json!(case_ids)),
    )
    .await
}

// Items

pub async fn get_item_count(conn: &Connection, context: &str) -> Result<Response> {
    send(conn, Request::get(ctx(context)?.then("itemCount")?)).await
}

pub async fn get_all_items(conn: &Connection, context: &str) -> Result<Response> {
    send(conn, Request::get(ctx(context)?.child("itemSearch", "*")?)).await
}

pub async fn get_item_by_id(conn: &Connection, context: &str, item_id: &str) -> Result<Response> {
    send(conn, Request::get(ctx(context)?.child("itemByID", item_id)?)).await
}

pub async fn get_item_by_index(conn: &Connection, context: &str, index: u64) -> Result<Response> {
    send(conn, Request::get(ctx(context)?.child("item", index.to_string())?)).await
}

pub async fn get_item_by_case_id(conn: &Connection, context: &str, case_id: u64) -> Result<Response> {
    send(
        conn,
        Request::get(ctx(context)?.child("itemByCaseID", case_id.to_string())?),
    )
    .await
}

pub async fn get_item_by_search(conn: &Connection, context: &str, search: &str) -> Result<Response> {
    send(conn, Request::get(ctx(context)?.child("itemSearch", search)?)).await
}

/// Append rows to a data context. Each item is an object keyed by
/// attribute name.
pub async fn create_items(conn: &Connection, context: &str, items: &impl Serialize) -> Result<Response> {
    send(
        conn,
        Request::create(ctx(context)?.then("item")?, to_values(items)?),
    )
    .await
}

pub async fn update_item_by_id(
    conn: &Connection,
    context: &str,
    item_id: &str,
    values: Value,
) -> Result<Response> {
    send(conn, Request::update(ctx(context)?.child("itemByID", item_id)?, values)).await
}

pub async fn update_item_by_index(
    conn: &Connection,
    context: &str,
    index: u64,
    values: Value,
) -> Result<Response> {
    send(
        conn,
        Request::update(ctx(context)?.child("item", index.to_string())?, values),
    )
    .await
}

pub async fn update_item_by_case_id(
    conn: &Connection,
    context: &str,
    case_id: u64,
    values: Value,
) -> Result<Response> {
    send(
        conn,
        Request::update(ctx(context)?.child("itemByCaseID", case_id.to_string())?, values),
    )
    .await
}
