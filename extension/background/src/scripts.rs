//! Page-side snippets evaluated through `Runtime.evaluate`.
//!
//! Arguments are embedded as JSON literals, which are valid JavaScript.

fn literal(value: Option<&str>) -> String {
	serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string())
}

/// Clicks the first element matching `selector`, or the first clickable
/// element whose visible text equals (then contains) `text`.
pub fn click(selector: Option<&str>, text: Option<&str>) -> String {
	format!(
		r#"(() => {{
  const selector = {selector};
  const text = {text};
  const label = (el) => (el.innerText || el.value || el.getAttribute('aria-label') || '').trim();
  let el = null;
  if (selector !== null) {{
    el = document.querySelector(selector);
  }} else {{
    const wanted = text.trim().toLowerCase();
    const candidates = Array.from(document.querySelectorAll(
      'a, button, summary, label, input[type=button], input[type=submit], [role=button], [role=link], [onclick]'
    ));
    el = candidates.find((c) => label(c).toLowerCase() === wanted)
      || candidates.find((c) => label(c).toLowerCase().includes(wanted));
  }}
  if (!el) return {{ clicked: false }};
  el.scrollIntoView({{ block: 'center', inline: 'center' }});
  el.click();
  return {{ clicked: true, tag: el.tagName.toLowerCase(), text: label(el).slice(0, 80) }};
}})()"#,
		selector = literal(selector),
		text = literal(text),
	)
}

/// Sets the value of an input, textarea, select or contenteditable element and
/// fires the events frameworks listen for.
pub fn fill(selector: &str, value: &str) -> String {
	format!(
		r#"(() => {{
  const el = document.querySelector({selector});
  const value = {value};
  if (!el) return {{ filled: false }};
  el.focus();
  if (el.isContentEditable) {{
    el.textContent = value;
  }} else {{
    const proto = Object.getPrototypeOf(el);
    const setter = Object.getOwnPropertyDescriptor(proto, 'value')?.set;
    if (setter) setter.call(el, value); else el.value = value;
  }}
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return {{ filled: true }};
}})()"#,
		selector = literal(Some(selector)),
		value = literal(Some(value)),
	)
}

/// Dumps web storage and cookies of the top frame.
pub const STORAGE_SNAPSHOT: &str = r#"(() => {
  const dump = (storage) => {
    const out = {};
    try {
      for (let i = 0; i < storage.length; i++) {
        const key = storage.key(i);
        out[key] = storage.getItem(key);
      }
    } catch (_) {}
    return out;
  };
  let local = {}, session = {};
  try { local = dump(window.localStorage); } catch (_) {}
  try { session = dump(window.sessionStorage); } catch (_) {}
  return {
    origin: location.origin,
    localStorage: local,
    sessionStorage: session,
    cookies: document.cookie,
  };
})()"#;
