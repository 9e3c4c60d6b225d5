//! Page scripts run through `BrowserSession::execute_script`.
//!
//! Every script returns a falsy value while the page is not ready yet, so the
//! navigator can poll it until the step timeout.

pub const DIALOG_ID: &str = "editarObjetoCatalogoConfiguracionShop_dialog";

pub const SHOP_TAB_XPATHS: &[&str] = &[
    "//a[@id='ui-id-31']",
    "//li[contains(@class, 'ui-tabs-tab')]/a[contains(text(), 'Shop')]",
    "//a[contains(text(), 'Shop')]",
];

pub const EDIT_SHOP_XPATHS: &[&str] = &[
    "//*[@id='editarShop']",
    "//button[contains(text(), 'Editar')]",
    "//button[contains(@class, 'editarShop')]",
];

pub const SAVE_XPATHS: &[&str] = &[
    "//button[contains(@class, 'opcionMenuGuardar') and contains(@class, 'primaryButton')]",
];

pub const CLICK_CATALOG_TAB: &str = r#"
const tab = document.getElementById('ui-id-2');
if (!tab) return false;
tab.click();
return true;
"#;

pub const SEARCH_BOX_READY: &str = r#"
const input = document.querySelector('input.buscadorListado');
return !!(input && !input.disabled && input.offsetParent !== null);
"#;

/// Replace the search text one character at a time; the list filters on keyup
pub const TYPE_SEARCH: &str = r#"
const input = document.querySelector('input.buscadorListado');
if (!input || input.disabled) return false;
const text = arguments[0];
const key = (type, k) => input.dispatchEvent(new KeyboardEvent(type, { key: k, bubbles: true }));
input.focus();
input.value = '';
input.dispatchEvent(new Event('input', { bubbles: true }));
for (const ch of text) {
    key('keydown', ch);
    input.value += ch;
    input.dispatchEvent(new Event('input', { bubbles: true }));
    key('keyup', ch);
}
key('keyup', 'Enter');
return true;
"#;

/// Number of result rows with a cell equal to the SKU, or null when none
pub const COUNT_MATCHES: &str = r#"
const sku = arguments[0].trim();
const rows = Array.from(document.querySelectorAll('table.tablaListado tr.lineaTD'));
const matches = rows.filter((row) =>
    Array.from(row.querySelectorAll('td')).some((td) => td.textContent.trim() === sku));
return matches.length > 0 ? matches.length : null;
"#;

pub const CLICK_MATCH: &str = r#"
const sku = arguments[0].trim();
const row = Array.from(document.querySelectorAll('table.tablaListado tr.lineaTD')).find((row) =>
    Array.from(row.querySelectorAll('td')).some((td) => td.textContent.trim() === sku));
if (!row) return false;
row.scrollIntoView();
row.click();
return true;
"#;

/// Click the first visible element matching one of the XPaths; returns the XPath used
pub const CLICK_FIRST: &str = r#"
for (const xpath of arguments[0]) {
    const el = document.evaluate(xpath, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null)
        .singleNodeValue;
    if (el && el.offsetParent !== null && !el.disabled) {
        el.scrollIntoView();
        el.click();
        return xpath;
    }
}
return null;
"#;

pub const ELEMENT_VISIBLE: &str = r#"
const el = document.getElementById(arguments[0]);
return !!(el && el.offsetParent !== null);
"#;

pub const ELEMENT_HIDDEN: &str = r#"
const el = document.getElementById(arguments[0]);
return !(el && el.offsetParent !== null);
"#;

/// Write shop fields inside the edit dialog.
///
/// `arguments[1]` is a list of `{name, id, kind, value}` with kind `text`,
/// `checkbox` or `rich_text`. Returns `{written, missing}` or null while the
/// dialog is not open.
pub const WRITE_FIELDS: &str = r#"
const [dialogId, fields, revealSeo] = arguments;
const dialog = document.getElementById(dialogId);
if (!dialog || dialog.offsetParent === null) return null;
const fire = (el) => ['input', 'change'].forEach((type) =>
    el.dispatchEvent(new Event(type, { bubbles: true })));

if (revealSeo) {
    const toggle = dialog.querySelector('#trMostrarOcultarCamposSeoShopTable');
    const seoTitle = dialog.querySelector('#seoTitleShop');
    if (toggle && (!seoTitle || seoTitle.offsetParent === null)) toggle.click();
}

const written = [];
const missing = [];
for (const field of fields) {
    if (field.kind === 'rich_text') {
        const frame = dialog.querySelector('iframe.cke_wysiwyg_frame');
        const body = frame && frame.contentDocument && frame.contentDocument.body;
        if (!body) { missing.push(field.name); continue; }
        body.innerHTML = field.value;
        fire(body);
        if (window.CKEDITOR) {
            Object.values(window.CKEDITOR.instances)
                .filter((editor) => editor.container && dialog.contains(editor.container.$))
                .forEach((editor) => editor.setData(field.value));
        }
        written.push(field.name);
        continue;
    }

    const el = dialog.querySelector('#' + field.id);
    if (!el) { missing.push(field.name); continue; }
    if (field.kind === 'checkbox') {
        if (el.checked !== field.value) el.click();
    } else {
        el.value = field.value;
        fire(el);
    }
    written.push(field.name);
}
return { written, missing };
"#;
