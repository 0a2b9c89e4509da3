//! REST paths used against an environment.
//!
//! Query values are percent-encoded here so callers pass raw names.

use urlencoding::encode;

pub const USERS: &str = "/api/v1/users";
pub const GROUPS: &str = "/api/v1/groups";
pub const ROLES: &str = "/api/roles";
pub const DATAMODELS: &str = "/api/v2/datamodels/schema?fields=oid,title,type";

const DASHBOARDS_ADMIN: &str = "/api/v1/dashboards/admin?dashboardType=owner&asObject=false";

pub fn users_all() -> String {
    format!("{}?expand=groups,role", USERS)
}

pub fn user_by_name(user_name: &str) -> String {
    format!("{}?userName={}&expand=groups,role", USERS, encode(user_name))
}

pub fn user_by_id(id: &str) -> String {
    format!("{}/{}", USERS, encode(id))
}

pub fn group_by_name(name: &str) -> String {
    format!("{}?name={}", GROUPS, encode(name))
}

pub fn group_by_id(id: &str) -> String {
    format!("{}/{}", GROUPS, encode(id))
}

pub fn dashboards_all() -> String {
    DASHBOARDS_ADMIN.to_string()
}

pub fn dashboard_by_id(id: &str) -> String {
    format!("{}&id={}", DASHBOARDS_ADMIN, encode(id))
}

pub fn dashboard_by_name(name: &str) -> String {
    format!("{}&name={}", DASHBOARDS_ADMIN, encode(name))
}

pub fn dashboard_export(id: &str) -> String {
    format!("/api/dashboards/{}/export?adminAccess=true", encode(id))
}

pub fn dashboard_import(action: &str, republish: bool) -> String {
    format!(
        "/api/v1/dashboards/import/bulk?action={}&republish={}",
        action, republish
    )
}

pub fn dashboard_publish(id: &str) -> String {
    format!("/api/v1/dashboards/{}/publish?force=true", encode(id))
}

pub fn dashboard_shares(id: &str) -> String {
    format!("/api/shares/dashboard/{}?adminAccess=true", encode(id))
}

pub fn dashboard_change_owner(id: &str) -> String {
    format!("/api/v1/dashboards/{}/change_owner?adminAccess=true", encode(id))
}

pub fn dashboard_script(id: &str) -> String {
    format!("/api/dashboards/{}", encode(id))
}

pub fn widget_script(dashboard_id: &str, widget_id: &str) -> String {
    format!(
        "/api/dashboards/{}/widgets/{}",
        encode(dashboard_id),
        encode(widget_id)
    )
}

pub fn datamodel_by_id(id: &str) -> String {
    format!("/api/v2/datamodels/{}/schema", encode(id))
}

pub fn datamodel_export(id: &str, dependencies: &str) -> String {
    let mut path = format!(
        "/api/v2/datamodel-exports/schema?datamodelId={}&type=schema-latest",
        encode(id)
    );
    if !dependencies.is_empty() {
        path.push_str("&dependenciesIdsToInclude=");
        path.push_str(&encode(dependencies));
    }
    path
}

pub fn datamodel_import_new(title: &str) -> String {
    format!("/api/v2/datamodel-imports/schema?newTitle={}", encode(title))
}

pub fn datamodel_import_into(target_id: &str) -> String {
    format!(
        "/api/v2/datamodel-imports/schema?targetDatamodelId={}",
        encode(target_id)
    )
}

/// Share list of a data model; extract and live models live under different roots.
pub fn datamodel_shares(model_type: &str, title: &str) -> String {
    if model_type.eq_ignore_ascii_case("live") {
        format!("/api/v1/elasticubes/live/{}/permissions", encode(title))
    } else {
        format!("/api/elasticubes/localhost/{}/permissions", encode(title))
    }
}

pub fn connection_by_id(id: &str) -> String {
    format!("/api/v2/connections/{}", encode(id))
}
