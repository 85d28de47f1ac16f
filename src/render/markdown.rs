use std::sync::OnceLock;

use minijinja::Environment;

use crate::entities::report::SearchReport;
use crate::error::PharmyrusError;
use crate::pipeline::aggregate::KnownMolecule;

static ENV: OnceLock<Environment<'static>> = OnceLock::new();

fn env() -> Result<&'static Environment<'static>, PharmyrusError> {
    if let Some(env) = ENV.get() {
        return Ok(env);
    }

    let mut env = Environment::new();
    env.add_filter("truncate", |s: String, max_bytes: usize| -> String {
        if s.len() <= max_bytes {
            return s;
        }
        if max_bytes == 0 {
            return "…".to_string();
        }
        let mut boundary = max_bytes;
        while boundary > 0 && !s.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let mut out = s[..boundary].trim_end().to_string();
        out.push('…');
        out
    });
    env.add_template(
        "search.md.j2",
        include_str!("../../templates/search.md.j2"),
    )?;

    let _ = ENV.set(env);
    ENV.get().ok_or_else(|| PharmyrusError::Api {
        api: "render".into(),
        message: "Template environment initialization failed".into(),
    })
}

pub fn search_markdown(report: &SearchReport) -> Result<String, PharmyrusError> {
    let tmpl = env()?.get_template("search.md.j2")?;
    Ok(tmpl.render(report)?)
}

pub fn molecules_markdown(molecules: &[KnownMolecule]) -> String {
    let mut out = String::from("# Known molecules\n\n");
    out.push_str("| Molecule | Brand | Expected filings |\n");
    out.push_str("|----------|-------|------------------|\n");
    for m in molecules {
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            m.name, m.brand, m.expected_filings
        ));
    }
    out
}
