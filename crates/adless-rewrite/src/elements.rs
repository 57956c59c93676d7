//! Element table
//!
//! Which elements carry URL-bearing attributes, in which order those
//! attributes are processed, and which request scope each reference gets
//! when it is matched.

use adless_core::ResourceType;

/// How an attribute value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// A single URL
    Url,
    /// A comma-separated candidate list (`srcset`)
    Srcset,
}

/// Request scope used when matching a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Fixed(ResourceType),
    /// `<link>`: derived from `rel` and `as`
    LinkRel,
    /// Resolved but never matched (`<base href>`)
    Unfiltered,
}

#[derive(Debug, Clone, Copy)]
pub struct UrlAttribute {
    pub name: &'static str,
    pub kind: AttributeKind,
    pub scope: Scope,
}

#[derive(Debug, Clone, Copy)]
pub struct ElementSpec {
    pub tag: &'static str,
    pub attributes: &'static [UrlAttribute],
}

const fn url(name: &'static str, scope: ResourceType) -> UrlAttribute {
    UrlAttribute {
        name,
        kind: AttributeKind::Url,
        scope: Scope::Fixed(scope),
    }
}

const fn srcset(scope: ResourceType) -> UrlAttribute {
    UrlAttribute {
        name: "srcset",
        kind: AttributeKind::Srcset,
        scope: Scope::Fixed(scope),
    }
}

const IMAGE_OR_MEDIA: ResourceType = ResourceType::IMAGE.union(ResourceType::MEDIA);

pub static URL_ELEMENTS: &[ElementSpec] = &[
    ElementSpec {
        tag: "img",
        attributes: &[url("src", ResourceType::IMAGE), srcset(ResourceType::IMAGE)],
    },
    ElementSpec {
        tag: "source",
        attributes: &[url("src", IMAGE_OR_MEDIA), srcset(IMAGE_OR_MEDIA)],
    },
    ElementSpec {
        tag: "script",
        attributes: &[url("src", ResourceType::SCRIPT)],
    },
    ElementSpec {
        tag: "link",
        attributes: &[UrlAttribute {
            name: "href",
            kind: AttributeKind::Url,
            scope: Scope::LinkRel,
        }],
    },
    ElementSpec {
        tag: "iframe",
        attributes: &[url("src", ResourceType::SUBDOCUMENT)],
    },
    ElementSpec {
        tag: "frame",
        attributes: &[url("src", ResourceType::SUBDOCUMENT)],
    },
    ElementSpec {
        tag: "a",
        attributes: &[url("href", ResourceType::OTHER)],
    },
    ElementSpec {
        tag: "area",
        attributes: &[url("href", ResourceType::OTHER)],
    },
    ElementSpec {
        tag: "form",
        attributes: &[url("action", ResourceType::OTHER)],
    },
    ElementSpec {
        tag: "video",
        attributes: &[url("src", ResourceType::MEDIA), url("poster", ResourceType::IMAGE)],
    },
    ElementSpec {
        tag: "audio",
        attributes: &[url("src", ResourceType::MEDIA)],
    },
    ElementSpec {
        tag: "track",
        attributes: &[url("src", ResourceType::MEDIA)],
    },
    ElementSpec {
        tag: "embed",
        attributes: &[url("src", ResourceType::OBJECT)],
    },
    ElementSpec {
        tag: "object",
        attributes: &[url("data", ResourceType::OBJECT)],
    },
    ElementSpec {
        tag: "input",
        attributes: &[url("src", ResourceType::IMAGE)],
    },
    ElementSpec {
        tag: "base",
        attributes: &[UrlAttribute {
            name: "href",
            kind: AttributeKind::Url,
            scope: Scope::Unfiltered,
        }],
    },
];

/// Look up an element by lowercase tag name.
pub fn lookup(tag: &str) -> Option<&'static ElementSpec> {
    URL_ELEMENTS.iter().find(|spec| spec.tag == tag)
}

/// Scope of a `<link href>` reference.
pub fn link_scope(rel: Option<&str>, as_type: Option<&str>) -> ResourceType {
    let rel = rel.unwrap_or("").to_ascii_lowercase();
    let mut scope = ResourceType::OTHER;

    for token in rel.split_ascii_whitespace() {
        match token {
            "stylesheet" => return ResourceType::STYLESHEET,
            "icon" | "apple-touch-icon" => scope = ResourceType::IMAGE,
            "preload" | "prefetch" | "modulepreload" => {
                scope = preload_scope(token, as_type);
            }
            _ => {}
        }
    }

    scope
}

fn preload_scope(rel: &str, as_type: Option<&str>) -> ResourceType {
    if rel == "modulepreload" {
        return ResourceType::SCRIPT;
    }
    match as_type.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("script") => ResourceType::SCRIPT,
        Some("style") => ResourceType::STYLESHEET,
        Some("image") => ResourceType::IMAGE,
        Some("font") => ResourceType::FONT,
        Some("audio") | Some("video") | Some("track") => ResourceType::MEDIA,
        Some("document") => ResourceType::SUBDOCUMENT,
        Some("fetch") => ResourceType::XMLHTTPREQUEST,
        _ => ResourceType::OTHER,
    }
}
