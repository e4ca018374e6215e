mod collections;
mod databases;
mod grants;
mod query;
mod roles;
mod usage;

use std::sync::Arc;

use axum::{Router, routing::get, routing::post};

use super::AppState;

/// Procedure routes in the manner of the original RPC gateway: one POST per
/// named procedure.
pub fn rpc_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rpc/whoami", get(usage::whoami))
        .route("/rpc/user_allowed", post(usage::user_allowed))
        .route("/rpc/get_version", get(usage::get_version))
        .route("/rpc/get_my_usage", post(usage::get_my_usage))
        .route("/rpc/log_event", post(usage::log_event))
        .route("/rpc/get_eventlog", post(usage::get_eventlog))
        // databases
        .route("/rpc/create_database", post(databases::create_database))
        .route("/rpc/truncate_database", post(databases::truncate_database))
        .route("/rpc/database_exists", post(databases::database_exists))
        .route("/rpc/get_my_databases", get(databases::get_my_databases))
        .route("/rpc/get_my_collections", post(databases::get_my_collections))
        // collections
        .route("/rpc/create_collection", post(collections::create_collection))
        .route(
            "/rpc/create_collections",
            post(collections::create_collections),
        )
        .route("/rpc/drop_collections", post(collections::drop_collections))
        .route("/rpc/add_properties", post(collections::add_properties))
        .route("/rpc/drop_properties", post(collections::drop_properties))
        .route("/rpc/get_properties", post(collections::get_properties))
        .route("/rpc/rename_collection", post(collections::rename_collection))
        .route("/rpc/copy_collection", post(collections::copy_collection))
        .route("/rpc/create_index", post(collections::create_index))
        .route("/rpc/drop_index", post(collections::drop_index))
        .route("/rpc/show_indexes", post(collections::show_indexes))
        .route("/rpc/insert_rows", post(collections::insert_rows))
        .route("/rpc/update_rows", post(collections::update_rows))
        .route("/rpc/delete_rows", post(collections::delete_rows))
        // grants
        .route("/rpc/grant_access", post(grants::grant_access))
        .route("/rpc/revoke_access", post(grants::revoke_access))
        .route("/rpc/publish_collection", post(grants::publish_collection))
        .route(
            "/rpc/unpublish_collection",
            post(grants::unpublish_collection),
        )
        .route(
            "/rpc/group_publish_collection",
            post(grants::group_publish_collection),
        )
        .route(
            "/rpc/group_unpublish_collection",
            post(grants::group_unpublish_collection),
        )
        .route(
            "/rpc/group_publish_database",
            post(grants::group_publish_database),
        )
        .route(
            "/rpc/group_unpublish_database",
            post(grants::group_unpublish_database),
        )
        .route("/rpc/list_my_grants", post(grants::list_my_grants))
        .route("/rpc/get_grants", post(grants::get_grants))
        // queries
        .route("/rpc/get_collection", post(query::get_collection))
        .route("/rpc/get_by_bbox", post(query::get_by_bbox))
        .route("/rpc/count_by_bbox", post(query::count_by_bbox))
        .route("/rpc/count_collection", post(query::count_collection))
        .route(
            "/rpc/estimate_collection_count",
            post(query::estimate_collection_count),
        )
        .route("/rpc/nearest", post(query::nearest))
        .route("/rpc/geometry_types", post(query::geometry_types))
        .route("/rpc/get_collection_bbox", post(query::get_collection_bbox))
        .route(
            "/rpc/estimate_collection_bbox",
            post(query::estimate_collection_bbox),
        )
        .route("/rpc/get_collection_srid", post(query::get_collection_srid))
        // role lifecycle (admin)
        .route("/rpc/register_user", post(roles::register_user))
        .route("/rpc/user_exists", post(roles::user_exists))
        .route("/rpc/drop_user", post(roles::drop_user))
        .route("/rpc/create_group", post(roles::create_group))
        .route("/rpc/group_grant", post(roles::group_grant))
        .route("/rpc/group_revoke", post(roles::group_revoke))
        .route("/rpc/get_group_users", post(roles::get_group_users))
        .route("/rpc/get_user_roles", post(roles::get_user_roles))
        .route("/rpc/create_token", post(roles::create_token))
}
