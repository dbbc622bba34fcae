//! URI template parsing for API resources.
//!
//! A template such as `/orders/{id}?status={s}` is split into a path part
//! with `{name}` parameters between slashes and a query part of
//! `key={variable}` pairs. Parsing validates the template shape once at
//! deployment time so request handling never re-parses it.

use std::collections::BTreeMap;

use thiserror::Error;

/// Parsed form of a resource URI template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UriTemplateInfo {
    /// The original template string, verbatim.
    pub full_template: String,
    /// Just the path part, without the query component.
    pub path_template: String,
    /// Path parameter names in declaration order.
    pub path_parameters: Vec<String>,
    /// Query parameter key to variable name. Ordered for stable output.
    pub query_parameters: BTreeMap<String, String>,
}

/// Template shape violations detected at parse time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriTemplateError {
    #[error("duplicate path parameter: {name} in uri-template: {template}")]
    DuplicatePathParameter { name: String, template: String },

    #[error(
        "invalid path parameter format in segment: '{segment}' of uri-template: {template}, expected '{{paramName}}'"
    )]
    MalformedPathSegment { segment: String, template: String },

    #[error("duplicate query parameter: {key} in uri-template: {template}")]
    DuplicateQueryParameter { key: String, template: String },

    #[error(
        "invalid query parameter value format: '{pair}' in uri-template: {template}, expected 'key={{variable}}'"
    )]
    MalformedQueryPair { pair: String, template: String },
}

impl UriTemplateInfo {
    /// Parse and validate a URI template.
    ///
    /// Path parameters must occupy a whole segment (`/{id}/`); a brace
    /// anywhere else in a segment is rejected. Query parameters must be of
    /// the form `key={variable}`. Duplicates on either side are rejected.
    pub fn parse(template: &str) -> Result<Self, UriTemplateError> {
        let (path_part, query_part) = match template.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (template, None),
        };

        let mut info = UriTemplateInfo {
            full_template: template.to_string(),
            path_template: path_part.to_string(),
            path_parameters: Vec::new(),
            query_parameters: BTreeMap::new(),
        };

        for segment in path_part.split('/') {
            if let Some(name) = segment
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
            {
                if name.is_empty() || name.contains(['{', '}']) {
                    return Err(UriTemplateError::MalformedPathSegment {
                        segment: segment.to_string(),
                        template: template.to_string(),
                    });
                }
                if info.path_parameters.iter().any(|p| p == name) {
                    return Err(UriTemplateError::DuplicatePathParameter {
                        name: name.to_string(),
                        template: template.to_string(),
                    });
                }
                info.path_parameters.push(name.to_string());
            } else if segment.contains(['{', '}']) {
                return Err(UriTemplateError::MalformedPathSegment {
                    segment: segment.to_string(),
                    template: template.to_string(),
                });
            }
        }

        if let Some(query) = query_part {
            for pair in query.split('&') {
                if pair.is_empty() {
                    continue;
                }
                let Some((key, value)) = pair.split_once('=') else {
                    return Err(UriTemplateError::MalformedQueryPair {
                        pair: pair.to_string(),
                        template: template.to_string(),
                    });
                };
                let Some(variable) = value
                    .strip_prefix('{')
                    .and_then(|rest| rest.strip_suffix('}'))
                else {
                    return Err(UriTemplateError::MalformedQueryPair {
                        pair: pair.to_string(),
                        template: template.to_string(),
                    });
                };
                if key.is_empty() || variable.is_empty() {
                    return Err(UriTemplateError::MalformedQueryPair {
                        pair: pair.to_string(),
                        template: template.to_string(),
                    });
                }
                if info.query_parameters.contains_key(key) {
                    return Err(UriTemplateError::DuplicateQueryParameter {
                        key: key.to_string(),
                        template: template.to_string(),
                    });
                }
                info.query_parameters
                    .insert(key.to_string(), variable.to_string());
            }
        }

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_path() {
        let info = UriTemplateInfo::parse("/orders").unwrap();
        assert_eq!(info.path_template, "/orders");
        assert!(info.path_parameters.is_empty());
        assert!(info.query_parameters.is_empty());
    }

    #[test]
    fn test_path_parameters_in_order() {
        let info = UriTemplateInfo::parse("/orders/{id}/items/{itemId}").unwrap();
        assert_eq!(info.path_parameters, vec!["id", "itemId"]);
        assert_eq!(info.path_template, "/orders/{id}/items/{itemId}");
    }

    #[test]
    fn test_query_parameters() {
        let info = UriTemplateInfo::parse("/orders/{id}?status={s}&limit={max}").unwrap();
        assert_eq!(info.path_template, "/orders/{id}");
        assert_eq!(info.query_parameters.get("status").map(String::as_str), Some("s"));
        assert_eq!(info.query_parameters.get("limit").map(String::as_str), Some("max"));
    }

    #[test]
    fn test_duplicate_path_parameter_rejected() {
        let err = UriTemplateInfo::parse("/x/{id}/{id}").unwrap_err();
        assert!(matches!(
            err,
            UriTemplateError::DuplicatePathParameter { ref name, .. } if name == "id"
        ));
    }

    #[test]
    fn test_duplicate_query_parameter_rejected() {
        let err = UriTemplateInfo::parse("/x?q={a}&q={b}").unwrap_err();
        assert!(matches!(
            err,
            UriTemplateError::DuplicateQueryParameter { ref key, .. } if key == "q"
        ));
    }

    #[test]
    fn test_malformed_brace_in_segment_rejected() {
        for template in ["/x/{id", "/x/id}", "/x/a{id}b", "/x/{}"] {
            let err = UriTemplateInfo::parse(template).unwrap_err();
            assert!(
                matches!(err, UriTemplateError::MalformedPathSegment { .. }),
                "template {template} should be rejected"
            );
        }
    }

    #[test]
    fn test_query_value_must_be_braced() {
        let err = UriTemplateInfo::parse("/x?q=literal").unwrap_err();
        assert!(matches!(err, UriTemplateError::MalformedQueryPair { .. }));
    }

    #[test]
    fn test_query_pair_without_equals_rejected() {
        let err = UriTemplateInfo::parse("/x?flag").unwrap_err();
        assert!(matches!(err, UriTemplateError::MalformedQueryPair { .. }));
    }

    /// Re-parsing the stored full template yields an identical structure.
    #[test]
    fn test_reparse_is_idempotent() {
        let first = UriTemplateInfo::parse("/a/{x}/b/{y}?k={v}&n={m}").unwrap();
        let second = UriTemplateInfo::parse(&first.full_template).unwrap();
        assert_eq!(first, second);
    }
}
