//! 页面内脚本
//!
//! 定位器和动作都以 JSON 注入，由同一段解释脚本执行。
//! 命中的元素打上 `data-pe-ref` 标记，动作脚本按标记取回元素。

use serde::Serialize;

use crate::error::AppResult;
use crate::infrastructure::{ElementAction, Locator};

pub const REF_ATTR: &str = "data-pe-ref";

const RESOLVE_TEMPLATE: &str = r#"
(() => {
    const query = __LOCATOR__;
    const token = __TOKEN__;
    const ATTR = __ATTR__;
    const ROLES = {
        button: 'button,[role=button],input[type=button],input[type=submit]',
        textbox: 'input:not([type]),input[type=text],input[type=search],textarea,[role=textbox]',
        row: 'tr,[role=row]',
        listitem: 'li,[role=listitem]',
        radio: 'input[type=radio],[role=radio]',
        checkbox: 'input[type=checkbox],[role=checkbox]',
        link: 'a,[role=link]',
        tab: '[role=tab]',
    };
    const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
    const textOf = (el) => norm(el.innerText || el.textContent);
    const visible = (el) => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
    const labelOf = (el) => {
        if (el.labels && el.labels.length) return textOf(el.labels[0]);
        const wrap = el.closest('label');
        return wrap ? textOf(wrap) : '';
    };
    const nameOf = (el) => norm(el.getAttribute('aria-label')) || labelOf(el)
        || norm(el.getAttribute('placeholder')) || textOf(el) || norm(el.value);
    const same = (actual, want, exact) => exact ? actual === norm(want) : actual.includes(norm(want));
    const innermost = (els) => els.filter((el) => !els.some((o) => o !== el && el.contains(o)));
    const all = (root, sel) => Array.from(root.querySelectorAll(sel));

    const find = (root, s) => {
        switch (s.kind) {
            case 'role':
                return all(root, ROLES[s.role] || `[role="${s.role}"]`)
                    .filter((el) => same(nameOf(el), s.name, s.exact));
            case 'text':
                return innermost(all(root, '*').filter((el) => same(textOf(el), s.text, s.exact)));
            case 'placeholder':
                return all(root, 'input,textarea').filter((el) => norm(el.getAttribute('placeholder')) === norm(s.text));
            case 'css':
                return all(root, s.selector).filter((el) => {
                    const t = textOf(el);
                    if (!(s.has_text || []).every((frag) => t.includes(norm(frag)))) return false;
                    return s.exact_text == null || t === norm(s.exact_text);
                });
            case 'within': {
                const scopes = find(root, s.scope).filter(visible);
                return scopes.length ? find(scopes[0], s.inner) : [];
            }
            case 'nth': {
                const hits = find(root, s.inner).filter(visible);
                return hits.length > s.index ? [hits[s.index]] : [];
            }
            default:
                throw new Error('unknown locator kind: ' + s.kind);
        }
    };

    const hits = find(document, query).filter(visible);
    all(document, '[' + ATTR + ']').forEach((el) => el.removeAttribute(ATTR));
    hits.forEach((el) => el.setAttribute(ATTR, token));
    return hits.length;
})()
"#;

const PERFORM_TEMPLATE: &str = r#"
(() => {
    const action = __ACTION__;
    const els = Array.from(document.querySelectorAll('[__ATTR__="__TOKEN__"]'));
    if (!els.length) throw new Error('stale element reference');
    const click = (el) => {
        el.scrollIntoView({ block: 'center', inline: 'center' });
        el.click();
    };
    const target = els[0];
    switch (action.kind) {
        case 'click':
            click(target);
            break;
        case 'click_all': {
            const limit = action.value == null ? els.length : Math.min(action.value, els.length);
            for (let i = 0; i < limit; i++) click(els[i]);
            break;
        }
        case 'fill': {
            target.focus();
            const proto = target instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
            const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
            setter.call(target, action.value);
            target.dispatchEvent(new Event('input', { bubbles: true }));
            target.dispatchEvent(new Event('change', { bubbles: true }));
            break;
        }
        case 'check':
            if (!target.checked && target.getAttribute('aria-checked') !== 'true') click(target);
            break;
        case 'uncheck':
            if (target.checked || target.getAttribute('aria-checked') === 'true') click(target);
            break;
        default:
            throw new Error('unknown action: ' + action.kind);
    }
    return true;
})()
"#;

fn js_literal<T: Serialize + ?Sized>(value: &T) -> AppResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// 生成定位脚本，返回命中数量
pub fn resolve_script(locator: &Locator, token: &str) -> AppResult<String> {
    Ok(RESOLVE_TEMPLATE
        .replace("__LOCATOR__", &js_literal(locator)?)
        .replace("__TOKEN__", &js_literal(token)?)
        .replace("__ATTR__", &js_literal(REF_ATTR)?))
}

/// 生成动作脚本
pub fn perform_script(action: &ElementAction, token: &str) -> AppResult<String> {
    // 标记值只由驱动生成（数字与连字符），可直接拼入选择器
    Ok(PERFORM_TEMPLATE
        .replace("__ACTION__", &js_literal(action)?)
        .replace("__TOKEN__", token)
        .replace("__ATTR__", REF_ATTR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_script_embeds_locator_as_json() {
        let script = resolve_script(&Locator::text("推广分析"), "ref-1").unwrap();
        assert!(script.contains(r#"{"kind":"text","text":"推广分析","exact":true}"#));
        assert!(script.contains(r#"const token = "ref-1";"#));
        assert!(!script.contains("__LOCATOR__"));
    }

    #[test]
    fn perform_script_embeds_action() {
        let script = perform_script(&ElementAction::Fill("2025-03-01".into()), "ref-7").unwrap();
        assert!(script.contains(r#"{"kind":"fill","value":"2025-03-01"}"#));
        assert!(script.contains(r#"[data-pe-ref="ref-7"]"#));
    }
}
