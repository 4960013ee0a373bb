//! Two-stage page compilation.
//!
//! A page names a base (layout) file and a content file. Stage one renders
//! the base as a plain-text template with the content file's raw source bound
//! to `content`; the output is then parsed as the page's own HTML-escaping
//! template. Each stage has its own environment, so the layout's syntax never
//! leaks into the page and vice versa.

use minijinja::value::Value;
use minijinja::{context, AutoEscape, Environment};
use tracing::debug;

use crate::content::records::{load, File, Page};
use crate::core::error::{Error, Result};
use crate::storage::EntityStore;
use crate::template::context::TemplateContext;
use crate::template::helpers;

/// Stage labels reported in compile errors
pub const BASE_STAGE: &str = "base";
/// Second stage, the composed page
pub const PAGE_STAGE: &str = "page";

/// A page ready to render
#[derive(Debug)]
pub struct CompiledPage {
    name: String,
    path: String,
    env: Environment<'static>,
}

impl CompiledPage {
    /// Page name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Route the page is served at
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Execute the page with `ctx` bound as `site`; output is fully buffered
    pub fn render(&self, ctx: TemplateContext) -> Result<String> {
        let template = self
            .env
            .get_template(&self.name)
            .map_err(|e| Error::TemplateRender(e.to_string()))?;
        template
            .render(context! { site => Value::from_object(ctx) })
            .map_err(|e| Error::TemplateRender(e.to_string()))
    }
}

fn compile_error(page: &Page, stage: &'static str, message: impl ToString) -> Error {
    Error::TemplateCompile {
        page: page.name.clone(),
        stage,
        message: message.to_string(),
    }
}

fn source_of(store: &dyn EntityStore, page: &Page, file: &str, stage: &'static str) -> Result<String> {
    let file = load::<File>(store, &File::key(file))?;
    String::from_utf8(file.data).map_err(|e| compile_error(page, stage, e))
}

/// Compile `page` from its base and template files
pub fn compile_page(store: &dyn EntityStore, page: &Page) -> Result<CompiledPage> {
    let base = source_of(store, page, &page.base, BASE_STAGE)?;
    let content = source_of(store, page, &page.template, PAGE_STAGE)?;

    let mut layout = Environment::new();
    layout.set_auto_escape_callback(|_| AutoEscape::None);
    layout
        .add_template_owned(page.base.clone(), base)
        .map_err(|e| compile_error(page, BASE_STAGE, e))?;
    let document = layout
        .get_template(&page.base)
        .and_then(|t| t.render(context! { content => content }))
        .map_err(|e| compile_error(page, BASE_STAGE, e))?;

    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    helpers::register(&mut env);
    env.add_template_owned(page.name.clone(), document)
        .map_err(|e| compile_error(page, PAGE_STAGE, e))?;

    debug!("Compiled page {:?} from {:?} + {:?}", page.name, page.base, page.template);
    Ok(CompiledPage {
        name: page.name.clone(),
        path: format!("/{}", page.name),
        env,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::records::save;
    use crate::query::{QueryEngine, QueryLimits, RequestParams};
    use crate::storage::MemStore;
    use crate::types::{Fields, Key, TypedValue};
    use std::sync::Arc;

    fn file(store: &MemStore, name: &str, source: &str) {
        let file = File {
            name: name.to_string(),
            data: source.as_bytes().to_vec(),
        };
        save(store, File::key(name), &file).unwrap();
    }

    fn page(name: &str, base: &str, template: &str) -> Page {
        Page {
            name: name.into(),
            base: base.into(),
            template: template.into(),
        }
    }

    fn ctx(store: Arc<MemStore>) -> TemplateContext {
        TemplateContext::new(
            QueryEngine::new(store, QueryLimits::default()),
            RequestParams::default(),
        )
    }

    #[test]
    fn test_two_stage_render() {
        let store = Arc::new(MemStore::new());
        file(&store, "base.html", "<main>{{ content }}</main>");
        file(
            &store,
            "list.html",
            r#"{% for p in site.Get("Post", "", none, 0, 0) %}<p>{{ p.Data.Title }}</p>{% endfor %}"#,
        );
        let mut fields = Fields::new();
        fields.insert("Title".into(), TypedValue::from("<b>bold"));
        store.put(Key::incomplete("Post", None), fields).unwrap();

        let compiled = compile_page(store.as_ref(), &page("list", "base.html", "list.html")).unwrap();
        assert_eq!(compiled.path(), "/list");
        let html = compiled.render(ctx(store)).unwrap();
        assert_eq!(html, "<main><p>&lt;b&gt;bold</p></main>");
    }

    #[test]
    fn test_helpers_registered_in_page_stage() {
        let store = Arc::new(MemStore::new());
        file(&store, "base.html", "{{ content }}");
        file(&store, "t.html", r#"{{ Type(1, "integer") }} {{ EqualString("a", "a") }}"#);
        let compiled = compile_page(store.as_ref(), &page("t", "base.html", "t.html")).unwrap();
        assert_eq!(compiled.render(ctx(store)).unwrap(), "true true");
    }

    #[test]
    fn test_broken_base_reports_stage() {
        let store = MemStore::new();
        file(&store, "base.html", "{% if %}");
        file(&store, "t.html", "hi");
        let err = compile_page(&store, &page("t", "base.html", "t.html")).unwrap_err();
        assert!(matches!(err, Error::TemplateCompile { stage: BASE_STAGE, .. }));
    }

    #[test]
    fn test_broken_page_reports_stage() {
        let store = MemStore::new();
        file(&store, "base.html", "{{ content }}");
        file(&store, "t.html", "{% for %}");
        let err = compile_page(&store, &page("t", "base.html", "t.html")).unwrap_err();
        assert!(matches!(err, Error::TemplateCompile { stage: PAGE_STAGE, .. }));
    }

    #[test]
    fn test_missing_base_file() {
        let store = MemStore::new();
        file(&store, "t.html", "hi");
        assert!(compile_page(&store, &page("t", "nope.html", "t.html")).is_err());
    }

    #[test]
    fn test_render_error_surfaces() {
        let store = Arc::new(MemStore::new());
        file(&store, "base.html", "{{ content }}");
        file(&store, "t.html", "{{ site.GetPrev() }}");
        let compiled = compile_page(store.as_ref(), &page("t", "base.html", "t.html")).unwrap();
        let err = compiled.render(ctx(store)).unwrap_err();
        assert!(matches!(err, Error::TemplateRender(ref msg) if msg.contains("'offset' not found")));
    }
}
