use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes::{auth, health, rbac};

#[derive(OpenApi)]
#[openapi(
	paths(
		health::health,
		auth::register,
		auth::login,
		auth::me,
		rbac::my_permissions,
		rbac::check_my_access,
		rbac::list_roles,
		rbac::get_role,
		rbac::create_role,
		rbac::update_role,
		rbac::delete_role,
		rbac::get_role_permissions,
		rbac::assign_permission_to_role,
		rbac::remove_permission_from_role,
		rbac::bulk_assign_permissions,
		rbac::bulk_remove_permissions,
		rbac::list_permissions,
		rbac::create_permission,
		rbac::delete_permission,
		rbac::get_user_roles,
		rbac::assign_role_to_user,
		rbac::revoke_role_from_user,
		rbac::set_default_role,
		rbac::get_effective_permissions,
		rbac::seed_defaults
	),
	components(
		schemas(
			health::HealthResponse,
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::rbac::Resource,
			models::rbac::Action,
			models::rbac::Role,
			models::rbac::RoleCreateRequest,
			models::rbac::RoleUpdateRequest,
			models::rbac::Permission,
			models::rbac::PermissionCreateRequest,
			models::rbac::RoleAssignment,
			models::rbac::AssignRoleRequest,
			models::rbac::DefaultRoleRequest,
			models::rbac::RolePermission,
			models::rbac::AssignPermissionToRoleRequest,
			models::rbac::BulkPermissionsRequest,
			models::rbac::BulkResult,
			models::rbac::RemovalResult,
			models::rbac::UserPermissions,
			models::rbac::AccessCheckResponse,
			models::rbac::SeedReport
		)
	),
	tags(
		(name = "Health", description = "Service health"),
		(name = "Auth", description = "Authentication endpoints"),
		(name = "RBAC", description = "Roles, permissions and assignments")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	add_request_examples(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn ensure_security_components(doc: &mut Value) {
	let Some(root) = doc.as_object_mut() else { return; };

	let components = root
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()));
	let Some(components) = components.as_object_mut() else { return; };

	let schemes = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()));
	let Some(schemes) = schemes.as_object_mut() else { return; };

	schemes.insert(
		"bearerAuth".to_string(),
		json!({
			"type": "http",
			"scheme": "bearer",
			"bearerFormat": "JWT"
		}),
	);
}

fn add_request_examples(doc: &mut Value) {
	let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) else { return; };

	for item in paths.values_mut() {
		let Some(operations) = item.as_object_mut() else { continue; };
		for operation in operations.values_mut() {
			apply_request_example(operation);
		}
	}
}

fn apply_request_example(operation: &mut Value) {
	let Some(app_json) = operation
		.pointer_mut("/requestBody/content/application~1json")
		.and_then(Value::as_object_mut)
	else {
		return;
	};
	let Some(reference) = app_json
		.get("schema")
		.and_then(|schema| schema.get("$ref"))
		.and_then(Value::as_str)
	else {
		return;
	};

	let example = match reference {
		"#/components/schemas/LoginRequest" => json!({
			"email": "ada@example.com",
			"password": "S3cureP@ssw0rd"
		}),
		"#/components/schemas/RegisterRequest" => json!({
			"name": "Ada Lovelace",
			"email": "ada@example.com",
			"password": "S3cureP@ssw0rd"
		}),
		"#/components/schemas/RoleCreateRequest" => json!({
			"name": "INSTRUCTOR",
			"description": "Teaches classes and manages attendance"
		}),
		"#/components/schemas/RoleUpdateRequest" => json!({ "is_active": false }),
		"#/components/schemas/PermissionCreateRequest" => json!({
			"name": "enrollment:approve",
			"resource": "ENROLLMENT",
			"action": "APPROVE",
			"description": "Approve pending course enrollments"
		}),
		"#/components/schemas/BulkPermissionsRequest" => json!({
			"permission_ids": ["00000000-0000-0000-0000-000000000000"]
		}),
		"#/components/schemas/DefaultRoleRequest" => json!({ "default_role": "MEMBER" }),
		_ => return,
	};

	app_json.insert("example".to_string(), example);
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn document_lists_guarded_rbac_paths_with_bearer_scheme() {
		let doc = serde_json::to_value(build_openapi(8000).unwrap()).unwrap();

		assert!(doc.pointer("/paths/~1rbac~1roles/get").is_some());
		assert!(doc.pointer("/paths/~1rbac~1seed/post").is_some());
		assert!(doc.pointer("/paths/~1rbac~1users~1{user_id}~1effective-permissions/get").is_some());
		assert_eq!(
			doc.pointer("/components/securitySchemes/bearerAuth/scheme"),
			Some(&json!("bearer"))
		);
		assert_eq!(doc.pointer("/servers/0/url"), Some(&json!("http://localhost:8000")));
	}
}
