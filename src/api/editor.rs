//! Editor routes under `/editor`
//!
//! - `GET|POST /editor`, `/editor/` - index; `?action=upload` imports a site archive
//! - `GET /editor/{files,pages,groups,all}.zip` - exports
//! - `/editor/files`, `/editor/pages`, `/editor/groups` - lists and mutations
//! - `/editor/group?gid=` - record tree of one group
//!
//! Every mutation answers 302 back to its own route and rebuilds the page
//! registry; failures answer 500 with the error text.

use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{Method, StatusCode, Uri};
use axum::middleware;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use minijinja::value::Value;
use minijinja::{context, AutoEscape, Environment};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::auth::require_editor;
use crate::api::form::EditorForm;
use crate::api::{blocking, found, not_found};
use crate::content::editing;
use crate::core::error::{Error, Result};
use crate::core::AppState;
use crate::query::RequestParams;
use crate::template::{helpers, TemplateContext};
use crate::transfer::{self, ImportLimits};
use crate::types::Key;

const TEMPLATES: [(&str, &str); 6] = [
    ("layout.html", include_str!("templates/layout.html")),
    ("index.html", include_str!("templates/index.html")),
    ("files.html", include_str!("templates/files.html")),
    ("pages.html", include_str!("templates/pages.html")),
    ("groups.html", include_str!("templates/groups.html")),
    ("group.html", include_str!("templates/group.html")),
];

static EDITOR_ENV: OnceCell<Environment<'static>> = OnceCell::new();

fn editor_env() -> Result<&'static Environment<'static>> {
    EDITOR_ENV
        .get_or_try_init(|| {
            let mut env = Environment::new();
            env.set_auto_escape_callback(|_| AutoEscape::Html);
            helpers::register(&mut env);
            for (name, source) in TEMPLATES {
                env.add_template(name, source)?;
            }
            Ok::<_, minijinja::Error>(env)
        })
        .map_err(|e| Error::internal(format!("editor templates: {e}")))
}

/// Editor router, guarded by [`require_editor`]
pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/editor", any(index))
        .route("/editor/", any(index))
        .route("/editor/files.zip", any(export))
        .route("/editor/pages.zip", any(export))
        .route("/editor/groups.zip", any(export))
        .route("/editor/all.zip", any(export))
        .route("/editor/files", any(files))
        .route("/editor/pages", any(pages))
        .route("/editor/groups", any(groups))
        .route("/editor/group", any(group))
        .layer(middleware::from_fn_with_state(state, require_editor))
}

fn editor_error(err: Error) -> Response {
    if err.is_server_error() {
        error!("Editor request failed: {}", err);
    } else {
        warn!("Editor request rejected: {}", err);
    }
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}

fn optional_key(token: &str) -> Result<Option<Key>> {
    if token.is_empty() {
        return Ok(None);
    }
    Key::decode(token).map(Some)
}

fn required_key(key: Option<Key>) -> Result<Key> {
    key.ok_or_else(|| Error::invalid_argument("'id' is required"))
}

async fn render(state: &Arc<AppState>, template: &'static str, params: RequestParams) -> Response {
    let engine = state.engine();
    let result = blocking(move || {
        let env = editor_env()?;
        let ctx = TemplateContext::new(engine, params);
        env.get_template(template)
            .and_then(|t| t.render(context! { site => Value::from_object(ctx) }))
            .map_err(|e| Error::TemplateRender(e.to_string()))
    })
    .await;
    match result {
        Ok(html) => Html(html).into_response(),
        Err(e) => editor_error(e),
    }
}

/// Rebuild the registry after a successful mutation and send the editor back
async fn finish(state: &Arc<AppState>, result: Result<()>, location: &str) -> Response {
    if let Err(e) = result {
        return editor_error(e);
    }
    let rebuilt = {
        let state = state.clone();
        blocking(move || state.registry.rebuild(state.store.as_ref())).await
    };
    match rebuilt {
        Ok(report) => {
            info!(
                "Routes rebuilt after edit: {} mounted, {} skipped",
                report.mounted.len(),
                report.skipped.len()
            );
            found(location).into_response()
        }
        Err(e) => {
            // stale routes must not outlive a failed rebuild
            state.registry.invalidate();
            editor_error(e)
        }
    }
}

async fn index(State(state): State<Arc<AppState>>, method: Method, form: EditorForm) -> Response {
    match method {
        Method::GET => render(&state, "index.html", form.query().clone()).await,
        Method::POST => {
            let store = state.store.clone();
            let limits = ImportLimits::from(&state.config.limits);
            let result = blocking(move || {
                if form.value("action") == "upload" {
                    let upload = form.require_file("file")?;
                    transfer::import_all(store.as_ref(), &upload.data, limits)?;
                }
                Ok(())
            })
            .await;
            finish(&state, result, "/editor").await
        }
        _ => not_found(),
    }
}

async fn export(State(state): State<Arc<AppState>>, method: Method, uri: Uri) -> Response {
    if method != Method::GET {
        return not_found();
    }
    let name = uri.path().trim_start_matches("/editor/").to_string();
    let engine = state.engine();
    let archive = {
        let name = name.clone();
        blocking(move || match name.as_str() {
            "files.zip" => transfer::export_files(engine.store().as_ref()),
            "pages.zip" => transfer::export_pages(engine.store().as_ref()),
            "groups.zip" => transfer::export_groups(&engine),
            "all.zip" => transfer::export_all(&engine),
            _ => Err(Error::not_found(name)),
        })
        .await
    };
    match archive {
        Ok(bytes) => (
            [
                (CONTENT_TYPE, "application/zip".to_string()),
                (CONTENT_DISPOSITION, format!("attachment; filename=\"{name}\"")),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => editor_error(e),
    }
}

async fn files(State(state): State<Arc<AppState>>, method: Method, form: EditorForm) -> Response {
    let key = match optional_key(&form.query_value("id")) {
        Ok(key) => key,
        Err(e) => return editor_error(e),
    };
    match method {
        Method::GET => render(&state, "files.html", form.query().clone()).await,
        Method::POST => {
            let store = state.store.clone();
            let max = state.config.limits.max_file_size;
            let limits = ImportLimits::from(&state.config.limits);
            let result = blocking(move || {
                let store = store.as_ref();
                match form.value("action").as_str() {
                    "upload" => {
                        transfer::import_files(store, &form.require_file("file")?.data, limits)?;
                    }
                    "delete" => {
                        editing::delete_entry(store, &required_key(key)?)?;
                    }
                    _ => match key {
                        Some(key) => {
                            let data = form.file("file").map(|upload| &upload.data[..]);
                            editing::edit_file(store, &key, data, max)?;
                        }
                        None => {
                            let name = form.value("name");
                            if name.is_empty() {
                                return Err(Error::empty_field("Name"));
                            }
                            editing::new_file(store, &name, &form.require_file("file")?.data, max)?;
                        }
                    },
                }
                Ok(())
            })
            .await;
            finish(&state, result, "/editor/files").await
        }
        _ => not_found(),
    }
}

async fn pages(State(state): State<Arc<AppState>>, method: Method, form: EditorForm) -> Response {
    let key = match optional_key(&form.query_value("id")) {
        Ok(key) => key,
        Err(e) => return editor_error(e),
    };
    match method {
        Method::GET => match key {
            Some(key) => {
                let store = state.store.clone();
                match blocking(move || editing::page_template(store.as_ref(), &key)).await {
                    Ok(template) => template.into_response(),
                    Err(e) => editor_error(e),
                }
            }
            None => render(&state, "pages.html", form.query().clone()).await,
        },
        Method::POST => {
            let store = state.store.clone();
            let limits = ImportLimits::from(&state.config.limits);
            let result = blocking(move || {
                let store = store.as_ref();
                let default = form.value("default");
                match form.value("action").as_str() {
                    "upload" => {
                        transfer::import_pages(store, &form.require_file("file")?.data, limits)?;
                    }
                    "delete" => {
                        editing::delete_entry(store, &required_key(key)?)?;
                    }
                    _ if !default.is_empty() => editing::set_default(store, &default)?,
                    _ => match key {
                        Some(key) => {
                            editing::edit_page(store, &key, &form.value("base"), &form.value("file"))?
                        }
                        None => {
                            editing::new_page(
                                store,
                                &form.value("name"),
                                &form.value("base"),
                                &form.value("file"),
                            )?;
                        }
                    },
                }
                Ok(())
            })
            .await;
            finish(&state, result, "/editor/pages").await
        }
        _ => not_found(),
    }
}

async fn groups(State(state): State<Arc<AppState>>, method: Method, form: EditorForm) -> Response {
    let key = match optional_key(&form.query_value("id")) {
        Ok(key) => key,
        Err(e) => return editor_error(e),
    };
    match method {
        Method::GET => render(&state, "groups.html", form.query().clone()).await,
        Method::POST => {
            let store = state.store.clone();
            let limits = ImportLimits::from(&state.config.limits);
            let result = blocking(move || {
                let store = store.as_ref();
                match form.value("action").as_str() {
                    "upload" => {
                        transfer::import_groups(store, &form.require_file("file")?.data, limits)?;
                    }
                    "delete" => {
                        editing::delete_entry(store, &required_key(key)?)?;
                    }
                    _ if key.is_none() => {
                        editing::new_group(store, &form.value("name"))?;
                    }
                    _ => {}
                }
                Ok(())
            })
            .await;
            finish(&state, result, "/editor/groups").await
        }
        _ => not_found(),
    }
}

async fn group(State(state): State<Arc<AppState>>, method: Method, form: EditorForm) -> Response {
    let gid = form.query_value("gid");
    if gid.is_empty() {
        return not_found();
    }
    let pid = form.query_value("pid");
    let (token, is_parent) = if pid.is_empty() {
        let id = form.query_value("id");
        let is_parent = id.is_empty();
        (id, is_parent)
    } else {
        (pid, true)
    };
    let key = match optional_key(&token) {
        Ok(key) => key,
        Err(e) => return editor_error(e),
    };

    match method {
        Method::GET => render(&state, "group.html", form.query().clone()).await,
        Method::POST => {
            let engine = state.engine();
            let location = format!("/editor/group?gid={}", urlencoding::encode(&gid));
            let result = blocking(move || {
                let store = engine.store().as_ref();
                if form.value("action") == "delete" {
                    editing::delete_record(store, &required_key(key)?)?;
                } else if is_parent {
                    let kind = match &key {
                        Some(parent) => parent.kind().to_string(),
                        None => editing::group_kind(store, &gid)?,
                    };
                    editing::new_record(store, &kind, key, &form)?;
                } else {
                    editing::edit_record(&engine, &required_key(key)?, &form)?;
                }
                Ok(())
            })
            .await;
            finish(&state, result, &location).await
        }
        _ => not_found(),
    }
}
