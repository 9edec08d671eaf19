//! Headless render backend (Node + Playwright subprocess).
//!
//! The compilation page builds its listing client-side, so a plain GET can
//! come back as an empty shell. This backend drives a headless Chromium until
//! the network goes idle, then hands the settled DOM to the extractor. The
//! child's stdout is JSON-only; everything else is an error.

use std::time::Duration;

use jurisearch_core::{Error, Result};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub final_url: String,
    pub status: Option<u16>,
    pub html: String,
    pub elapsed_ms: u64,
}

fn env_truthy(k: &str) -> bool {
    matches!(
        std::env::var(k)
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(k: &str) -> Option<u64> {
    std::env::var(k).ok().and_then(|s| s.trim().parse::<u64>().ok())
}

fn node_path_candidates() -> Vec<String> {
    // Best-effort Node global module roots across common setups. Users with
    // unusual layouts can set NODE_PATH or JURISEARCH_NODE_PATH instead.
    let mut out: Vec<String> = Vec::new();

    if let Some(home) = std::env::var_os("HOME").map(std::path::PathBuf::from) {
        out.push(
            home.join(".npm-global")
                .join("lib")
                .join("node_modules")
                .to_string_lossy()
                .to_string(),
        );
        out.push(
            home.join(".nvm")
                .join("versions")
                .join("node")
                .to_string_lossy()
                .to_string(),
        );
    }

    out.push("/opt/homebrew/lib/node_modules".to_string());
    out.push("/usr/local/lib/node_modules".to_string());
    out.push("/usr/lib/node_modules".to_string());

    out
}

fn detect_node_path_for_playwright() -> Option<String> {
    fn node_path_has_playwright(np: &str) -> bool {
        let s = np.trim();
        if s.is_empty() {
            return false;
        }
        for part in s.split(':') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if std::path::PathBuf::from(part).join("playwright").is_dir() {
                return true;
            }
        }
        false
    }

    fn npm_root_g() -> Option<String> {
        let out = std::process::Command::new("npm")
            .args(["root", "-g"])
            .output()
            .ok()?;
        if !out.status.success() {
            return None;
        }
        let s = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if s.is_empty() {
            return None;
        }
        if std::path::PathBuf::from(&s).join("playwright").is_dir() {
            Some(s)
        } else {
            None
        }
    }

    // Explicit override (lets users keep NODE_PATH clean globally).
    if let Ok(v) = std::env::var("JURISEARCH_NODE_PATH") {
        let v = v.trim();
        if !v.is_empty() {
            return Some(v.to_string());
        }
    }

    // If NODE_PATH already resolves Playwright, leave it alone.
    let existing = std::env::var("NODE_PATH").ok().unwrap_or_default();
    if node_path_has_playwright(&existing) {
        return None;
    }

    let found = npm_root_g().or_else(|| {
        node_path_candidates().into_iter().find(|root| {
            !root.trim().is_empty()
                && std::path::PathBuf::from(root.trim()).join("playwright").is_dir()
        })
    })?;

    if existing.trim().is_empty() {
        Some(found)
    } else {
        Some(format!("{existing}:{found}"))
    }
}

/// Renders one page and returns the settled DOM.
///
/// `timeout_ms` is the whole in-page budget: navigation plus the wait for
/// network idle. A page still chattering when it runs out is a
/// [`Error::RenderTimeout`], not a partial success.
pub async fn render_page(url: &str, timeout_ms: u64) -> Result<RenderedPage> {
    // Deterministic escape hatch (tests and "no local tooling" environments).
    if env_truthy("JURISEARCH_RENDER_DISABLE") {
        return Err(Error::NotConfigured(
            "render backend disabled (JURISEARCH_RENDER_DISABLE)".to_string(),
        ));
    }

    // We intentionally do not auto-install Playwright at runtime; expected
    // setup is Node.js plus the `playwright` npm package plus chromium
    // (`npx playwright install chromium`). Stdout is kept JSON-only.
    const JS: &str = r#"
const fs = require('fs');

function ok(obj) { process.stdout.write(JSON.stringify(obj)); }
function bad(code, message, hint) { ok({ ok: false, error: { code, message, hint } }); }

async function main() {
  // Prefer stdin for passing args to avoid argv quoting/encoding issues.
  let arg = '';
  try { arg = fs.readFileSync(0, 'utf8'); } catch (_) {}
  if (!arg || !String(arg).trim()) arg = process.argv[2] || '';
  let req;
  try { req = JSON.parse(arg); } catch (e) { return bad('invalid_params', 'bad JSON args', 'Internal error: could not parse render args.'); }

  let pw;
  try { pw = require('playwright'); } catch (e) {
    return bad('not_configured',
      'Playwright is not installed for Node.js (require("playwright") failed)',
      'Install Playwright (Node): `npm i -g playwright` and then `npx playwright install chromium`.');
  }

  const url = String(req.url || '').trim();
  if (!url) return bad('invalid_params', 'url must be non-empty', 'Pass an absolute URL like https://example.com.');

  const timeoutMs = Number(req.timeout_ms || 30000);
  const blockResources = (req.block_resources === undefined) ? true : !!req.block_resources;

  const t0 = Date.now();
  let browser;
  try {
    browser = await pw.chromium.launch({ headless: true });
    const context = await browser.newContext({ serviceWorkers: 'block' });
    const page = await context.newPage();
    // Images/media/fonts never reach the extractor; skip them.
    if (blockResources && page.route) {
      try {
        await page.route('**/*', (route) => {
          const r = route.request();
          const rt = r && r.resourceType ? r.resourceType() : '';
          if (rt === 'image' || rt === 'media' || rt === 'font') return route.abort();
          return route.continue();
        });
      } catch (_) {}
    }

    let resp;
    try {
      resp = await page.goto(url, { waitUntil: 'domcontentloaded', timeout: timeoutMs });
      // The listing is filled in by XHR after load; the corpus is only
      // complete once the network goes quiet. The remaining budget applies.
      await page.waitForLoadState('networkidle', { timeout: Math.max(1, timeoutMs - (Date.now() - t0)) });
    } catch (e) {
      if (e && e.name === 'TimeoutError') {
        return bad('timeout', 'page did not reach network idle in time', 'Raise the render timeout, or switch to the static fetch mode.');
      }
      throw e;
    }

    const html = await page.content();
    ok({ ok: true, final_url: page.url(), status: resp ? resp.status() : null, html, elapsed_ms: Date.now() - t0 });
  } catch (e) {
    bad('render_failed', String(e && e.message ? e.message : e), 'Headless render failed. Try a longer timeout, or a different URL.');
  } finally {
    try { if (browser) await browser.close(); } catch (_) {}
  }
}

main().catch((e) => bad('render_failed', String(e && e.message ? e.message : e), 'Headless render failed.'));
"#;

    let t0 = std::time::Instant::now();
    let block_resources = std::env::var("JURISEARCH_RENDER_BLOCK_RESOURCES")
        .ok()
        .map(|s| s.trim().to_ascii_lowercase())
        .map(|s| !(s == "0" || s == "false" || s == "no" || s == "off"))
        .unwrap_or(true);
    let args_json = serde_json::json!({
        "url": url,
        "timeout_ms": timeout_ms,
        "block_resources": block_resources,
    })
    .to_string();

    // Hard wall-clock timeout for the whole Node+Playwright operation. This
    // must wrap the child wait; checking elapsed after completion does not
    // prevent hangs.
    let hard_timeout_ms =
        env_u64("JURISEARCH_RENDER_HARD_TIMEOUT_MS").unwrap_or(timeout_ms.saturating_add(10_000));

    let node_bin = std::env::var("JURISEARCH_NODE").unwrap_or_else(|_| "node".to_string());

    let mut cmd = tokio::process::Command::new(node_bin);
    if let Some(node_path) = detect_node_path_for_playwright() {
        cmd.env("NODE_PATH", node_path);
    }
    let mut child = cmd
        .arg("-e")
        .arg(JS)
        .kill_on_drop(true)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| {
            Error::NotConfigured(format!(
                "headless render requires Node.js (`node`) and the Playwright npm package: {e}"
            ))
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // Best-effort: on a failed write the child reports its own JSON error
        // or the outer wait fails.
        let _ = stdin.write_all(args_json.as_bytes()).await;
        // EOF so the script's readFileSync(0, ...) completes.
        let _ = stdin.shutdown().await;
    }

    // `wait_with_output` consumes the child, which prevents killing it on
    // timeout. Read the pipes concurrently and `wait()` under the hard cap.
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Render("missing stdout pipe".to_string()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Render("missing stderr pipe".to_string()))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = tokio::io::AsyncReadExt::read_to_end(&mut stdout, &mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = tokio::io::AsyncReadExt::read_to_end(&mut stderr, &mut buf).await;
        buf
    });

    match tokio::time::timeout(Duration::from_millis(hard_timeout_ms), child.wait()).await {
        Ok(r) => {
            r.map_err(|e| {
                Error::NotConfigured(format!(
                    "headless render requires Node.js (`node`) and the Playwright npm package: {e}"
                ))
            })?;
        }
        Err(_) => {
            let _ = child.kill().await;
            // No zombies; wait best-effort.
            let _ = child.wait().await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(Error::RenderTimeout {
                ms: hard_timeout_ms,
            });
        }
    }

    let out_stdout = stdout_task.await.unwrap_or_default();
    let out_stderr = stderr_task.await.unwrap_or_default();

    let max_html_chars = std::env::var("JURISEARCH_RENDER_MAX_HTML_CHARS")
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(2_000_000);

    parse_render_output(
        &String::from_utf8_lossy(&out_stdout),
        &String::from_utf8_lossy(&out_stderr),
        url,
        timeout_ms,
        max_html_chars,
        t0.elapsed().as_millis() as u64,
    )
}

/// Decodes the child's JSON-only stdout protocol into a page or an error.
/// Node exiting non-zero is fine as long as stdout held the JSON.
fn parse_render_output(
    stdout: &str,
    stderr: &str,
    url: &str,
    timeout_ms: u64,
    max_html_chars: usize,
    fallback_elapsed_ms: u64,
) -> Result<RenderedPage> {
    let stdout = stdout.trim();
    let v: serde_json::Value = serde_json::from_str(stdout).map_err(|e| {
        let stderr = stderr.trim();
        if stderr.is_empty() {
            Error::Render(format!("render child returned invalid JSON: {e}"))
        } else {
            Error::Render(format!(
                "render child returned invalid JSON: {e}. stderr: {stderr}"
            ))
        }
    })?;

    if v.get("ok").and_then(|x| x.as_bool()) != Some(true) {
        let code = v
            .pointer("/error/code")
            .and_then(|x| x.as_str())
            .unwrap_or("render_failed");
        let message = v
            .pointer("/error/message")
            .and_then(|x| x.as_str())
            .unwrap_or("headless render failed");
        let hint = v
            .pointer("/error/hint")
            .and_then(|x| x.as_str())
            .unwrap_or("")
            .trim();

        let with_hint = |m: &str| {
            if hint.is_empty() {
                m.to_string()
            } else {
                format!("{m}. {hint}")
            }
        };
        return Err(match code {
            "timeout" => Error::RenderTimeout { ms: timeout_ms },
            "not_configured" => Error::NotConfigured(with_hint(message)),
            "invalid_params" => Error::InvalidUrl(with_hint(message)),
            _ => Error::Render(with_hint(message)),
        });
    }

    let final_url = v
        .get("final_url")
        .and_then(|x| x.as_str())
        .unwrap_or(url)
        .to_string();
    let status = v.get("status").and_then(|x| x.as_u64()).map(|n| n as u16);
    let html = v
        .get("html")
        .and_then(|x| x.as_str())
        .unwrap_or("")
        .to_string();
    let elapsed_ms = v
        .get("elapsed_ms")
        .and_then(|x| x.as_u64())
        .unwrap_or(fallback_elapsed_ms);

    // An empty DOM must not look like success.
    if html.trim().is_empty() {
        return Err(Error::Render("render returned empty HTML".to_string()));
    }
    if html.len() > max_html_chars {
        return Err(Error::Render(format!(
            "render HTML too large ({} chars > JURISEARCH_RENDER_MAX_HTML_CHARS={})",
            html.len(),
            max_html_chars
        )));
    }

    Ok(RenderedPage {
        final_url,
        status,
        html,
        elapsed_ms,
    })
}
