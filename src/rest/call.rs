use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::path::RestPath;
use super::verb::HttpVerb;
use crate::error::{Result, SearchError};
use crate::gene::{raw_value, GeneArena, GeneId, GeneSpec};
use crate::search::action::{Action, ActionKind, ActionTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestParam {
    pub name: String,
    pub location: ParamLocation,
}

impl RestParam {
    pub fn new(name: &str, location: ParamLocation) -> Self {
        Self {
            name: name.to_string(),
            location,
        }
    }
}

/// HTTP call on one endpoint.
///
/// `params[i]` describes the i-th gene of the action. A call with
/// `save_location` stores the location of the resource it creates; a call
/// with a `location_id` targets the resource saved under that id instead of
/// resolving its own path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestCall {
    pub verb: HttpVerb,
    pub path: RestPath,
    pub params: Vec<RestParam>,
    pub auth: Option<String>,
    pub save_location: bool,
    pub location_id: Option<String>,
}

impl RestCall {
    pub fn new(verb: HttpVerb, path: RestPath, params: Vec<RestParam>) -> Self {
        Self {
            verb,
            path,
            params,
            auth: None,
            save_location: false,
            location_id: None,
        }
    }

    /// Template named `VERB:/path`. Every path variable needs a path
    /// parameter of the same name.
    pub fn template(verb: HttpVerb, path: &str, params: Vec<(RestParam, GeneSpec)>) -> Result<ActionTemplate> {
        let path = RestPath::new(path)?;
        for v in path.variable_names() {
            let declared = params
                .iter()
                .any(|(p, _)| p.location == ParamLocation::Path && p.name == v);
            if !declared {
                return Err(SearchError::InvalidTemplate(format!(
                    "no path parameter for variable {} in {}",
                    v, path
                )));
            }
        }

        let name = format!("{}:{}", verb, path);
        let (params, genes): (Vec<RestParam>, Vec<GeneSpec>) = params.into_iter().unzip();
        Ok(ActionTemplate::new(
            &name,
            ActionKind::Rest(RestCall::new(verb, path, params)),
            genes,
        ))
    }

    /// Path parameter genes of `action`, by name
    pub fn path_param_genes(&self, action: &Action) -> Vec<(String, GeneId)> {
        self.params
            .iter()
            .zip(action.see_genes().iter())
            .filter(|(p, _)| p.location == ParamLocation::Path)
            .map(|(p, g)| (p.name.clone(), *g))
            .collect()
    }

    /// Concrete URL path of `action`
    pub fn resolved_path(&self, arena: &GeneArena, action: &Action) -> Result<String> {
        let mut values = HashMap::new();
        for (name, gene) in self.path_param_genes(action) {
            values.insert(name, raw_value(arena, gene)?);
        }
        Ok(self.path.resolve(&values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::individual::Individual;
    use crate::types::SampleType;

    #[test]
    fn test_template_requires_path_params() {
        let result = RestCall::template(HttpVerb::Get, "/x/{id}", Vec::new());
        assert!(matches!(result, Err(SearchError::InvalidTemplate(_))));

        let template = RestCall::template(
            HttpVerb::Get,
            "/x/{id}",
            vec![(RestParam::new("id", ParamLocation::Path), GeneSpec::integer("id", 0, 9))],
        )
        .unwrap();
        assert_eq!(template.name, "GET:/x/{id}");
    }

    #[test]
    fn test_resolved_path() {
        let template = RestCall::template(
            HttpVerb::Delete,
            "/x/{id}",
            vec![
                (RestParam::new("id", ParamLocation::Path), GeneSpec::string_value("id", "abc")),
                (RestParam::new("q", ParamLocation::Query), GeneSpec::integer("q", 0, 9)),
            ],
        )
        .unwrap();
        let mut ind = Individual::new(SampleType::Random);
        ind.add_action(&template, None).unwrap();
        let action = &ind.see_actions()[0];
        let call = action.as_rest().unwrap();

        assert_eq!(call.path_param_genes(action).len(), 1);
        assert_eq!(call.resolved_path(ind.arena(), action).unwrap(), "/x/abc");
    }
}
