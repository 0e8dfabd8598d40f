//! Custom parameters and custom data.
//!
//! Both namespaces belong to the orchestrator.  Reads come from the cached
//! config; writes publish a complete replacement object and wait for the
//! orchestrator to deliver the updated config back.  Nothing is stored
//! locally.

use std::path::Path;

use pg_protocol::{object_from_pairs, pairs_from_object, Namespace, Outbound, Pair};
use pulldown_cmark::{html, Options, Parser};
use serde_json::{Map, Value};

use crate::publisher::Publisher;
use crate::session::Session;

pub struct ParamStore<'a> {
    pub(crate) session: &'a Session,
    pub(crate) publisher: &'a Publisher,
    pub(crate) doc_path: &'a Path,
}

impl ParamStore<'_> {
    fn section(&self, ns: Namespace) -> Option<Map<String, Value>> {
        self.session.config_section(ns.config_key())
    }

    /// Every pair in `ns`; empty when the namespace is missing or malformed.
    pub fn get(&self, ns: Namespace) -> Vec<Pair> {
        self.section(ns)
            .map(|obj| pairs_from_object(&obj))
            .unwrap_or_default()
    }

    /// Value of the last pair in `ns` whose key is `key`.
    pub fn get_one(&self, ns: Namespace, key: &str) -> Option<String> {
        self.get(ns)
            .into_iter()
            .filter(|p| p.key == key)
            .last()
            .map(|p| p.value)
    }

    /// Replace `ns` with exactly `pairs`.
    pub fn save(&self, ns: Namespace, pairs: &[Pair]) {
        self.publish(ns, object_from_pairs(pairs));
    }

    /// Merge `pairs` into the current `ns`, overwriting colliding keys.
    pub fn add(&self, ns: Namespace, pairs: &[Pair]) {
        let mut content = self.section(ns).unwrap_or_default();
        for pair in pairs {
            content.insert(pair.key.clone(), Value::String(pair.value.clone()));
        }
        self.publish(ns, content);
    }

    /// Republish `ns` without `key`.  Returns whether the key was present.
    pub fn remove(&self, ns: Namespace, key: &str) -> bool {
        let mut content = self.section(ns).unwrap_or_default();
        let existed = content.remove(key).is_some();
        if !existed {
            tracing::debug!(namespace = %ns, key, "removing a key that is not set");
        }
        self.publish(ns, content);
        existed
    }

    fn publish(&self, ns: Namespace, content: Map<String, Value>) {
        tracing::info!(namespace = %ns, keys = content.len(), "publishing namespace");
        self.publisher.send_message(&Outbound::namespace(ns, content));
    }

    /// Publish the rendered parameter documentation, once per session.
    ///
    /// Returns whether this call published it.  A missing doc file is logged
    /// and still consumes the one-shot.
    pub fn set_custom_params_doc(&self) -> bool {
        if !self.session.claim_doc_send() {
            return false;
        }

        let source = match std::fs::read_to_string(self.doc_path) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(
                    path = %self.doc_path.display(),
                    error = %e,
                    "cannot read parameter documentation"
                );
                return false;
            }
        };

        self.publisher
            .send_message(&Outbound::CustomParamsDoc(render_markdown(&source)));
        true
    }
}

fn render_markdown(source: &str) -> String {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TASKLISTS);

    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(source, opts));
    out
}
