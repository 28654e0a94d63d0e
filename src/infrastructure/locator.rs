//! 元素定位描述
//!
//! 定位器是纯数据，序列化为 JSON 后交给页面内脚本解释执行，
//! 因此可以在任意 iframe 的执行上下文里复用同一套查找逻辑。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 单个定位策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// 按可访问性角色与名称查找（button / textbox / row / listitem / radio / checkbox ...）
    Role {
        role: String,
        name: String,
        exact: bool,
    },
    /// 按可见文本查找，取最内层元素
    Text { text: String, exact: bool },
    /// 按输入框 placeholder 查找
    Placeholder { text: String },
    /// CSS 选择器，可附加文本过滤
    Css {
        selector: String,
        /// 元素文本必须全部包含这些片段
        #[serde(default)]
        has_text: Vec<String>,
        /// 元素文本必须完全等于该值
        #[serde(default)]
        exact_text: Option<String>,
    },
    /// 在 scope 命中的第一个元素内部继续查找
    Within { scope: Box<Locator>, inner: Box<Locator> },
    /// 取命中结果中的第 index 个（从 0 开始）
    Nth { inner: Box<Locator>, index: usize },
}

impl Locator {
    pub fn role(role: &str, name: &str) -> Self {
        Locator::Role {
            role: role.to_string(),
            name: name.to_string(),
            exact: true,
        }
    }

    pub fn role_contains(role: &str, name: &str) -> Self {
        Locator::Role {
            role: role.to_string(),
            name: name.to_string(),
            exact: false,
        }
    }

    pub fn text(text: &str) -> Self {
        Locator::Text {
            text: text.to_string(),
            exact: true,
        }
    }

    pub fn text_contains(text: &str) -> Self {
        Locator::Text {
            text: text.to_string(),
            exact: false,
        }
    }

    pub fn placeholder(text: &str) -> Self {
        Locator::Placeholder {
            text: text.to_string(),
        }
    }

    pub fn css(selector: &str) -> Self {
        Locator::Css {
            selector: selector.to_string(),
            has_text: Vec::new(),
            exact_text: None,
        }
    }

    pub fn css_has_text(selector: &str, fragments: &[&str]) -> Self {
        Locator::Css {
            selector: selector.to_string(),
            has_text: fragments.iter().map(|s| s.to_string()).collect(),
            exact_text: None,
        }
    }

    pub fn css_exact_text(selector: &str, text: &str) -> Self {
        Locator::Css {
            selector: selector.to_string(),
            has_text: Vec::new(),
            exact_text: Some(text.to_string()),
        }
    }

    pub fn within(self, inner: Locator) -> Self {
        Locator::Within {
            scope: Box::new(self),
            inner: Box::new(inner),
        }
    }

    pub fn nth(self, index: usize) -> Self {
        Locator::Nth {
            inner: Box::new(self),
            index,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Role { role, name, exact } => {
                write!(f, "role={}[{}{}]", role, if *exact { "=" } else { "~" }, name)
            }
            Locator::Text { text, exact } => {
                write!(f, "text{}\"{}\"", if *exact { "=" } else { "~" }, text)
            }
            Locator::Placeholder { text } => write!(f, "placeholder=\"{}\"", text),
            Locator::Css {
                selector,
                has_text,
                exact_text,
            } => {
                write!(f, "css={}", selector)?;
                if !has_text.is_empty() {
                    write!(f, "(has {:?})", has_text)?;
                }
                if let Some(t) = exact_text {
                    write!(f, "(= \"{}\")", t)?;
                }
                Ok(())
            }
            Locator::Within { scope, inner } => write!(f, "{} >> {}", scope, inner),
            Locator::Nth { inner, index } => write!(f, "{} >> nth={}", inner, index),
        }
    }
}

/// iframe 路径中的一跳
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FrameHop {
    /// 子 frame 的 URL 包含该片段
    UrlContains(String),
    /// 第 n 个子 frame
    Child(usize),
}

/// 从主 frame 出发的 iframe 路径，空路径表示主 frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePath(pub Vec<FrameHop>);

impl FramePath {
    pub fn main() -> Self {
        Self(Vec::new())
    }

    pub fn url(fragment: &str) -> Self {
        Self(vec![FrameHop::UrlContains(fragment.to_string())])
    }

    pub fn child(index: usize) -> Self {
        Self(vec![FrameHop::Child(index)])
    }

    pub fn then_url(mut self, fragment: &str) -> Self {
        self.0.push(FrameHop::UrlContains(fragment.to_string()));
        self
    }

    pub fn is_main(&self) -> bool {
        self.0.is_empty()
    }

    pub fn hops(&self) -> &[FrameHop] {
        &self.0
    }
}

impl fmt::Display for FramePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("main");
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|hop| match hop {
                FrameHop::UrlContains(s) => format!("url~{}", s),
                FrameHop::Child(i) => format!("child[{}]", i),
            })
            .collect();
        f.write_str(&parts.join(" > "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_locator_serializes_for_page_script() {
        let loc = Locator::css_has_text("tr", &["20250301"])
            .nth(1)
            .within(Locator::text("下载"));
        let json = serde_json::to_value(&loc).unwrap();
        assert_eq!(json["kind"], "within");
        assert_eq!(json["scope"]["kind"], "nth");
        assert_eq!(json["scope"]["index"], 1);
        assert_eq!(json["scope"]["inner"]["has_text"][0], "20250301");
        assert_eq!(json["inner"]["text"], "下载");
        assert_eq!(json["inner"]["exact"], true);
    }

    #[test]
    fn display_is_readable_in_logs() {
        let loc = Locator::role("button", "确定");
        assert_eq!(loc.to_string(), "role=button[=确定]");
        let path = FramePath::child(0).then_url("midas.dianping.com");
        assert_eq!(path.to_string(), "child[0] > url~midas.dianping.com");
    }
}
