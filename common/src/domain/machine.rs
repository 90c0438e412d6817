use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, net::IpAddr};
use uuid::Uuid;

use super::MachineName;

/// One set of benchmark run filters, e.g. `{"lang": "Python", "threads": 4}`.
/// Values stay as loose JSON since filters are machine-defined key-value pairs.
pub type FilterMap = BTreeMap<String, serde_json::Value>;

/// A registered benchmark machine.
///
/// `default_filters` maps a benchmarkable type (commit, pull request, ...) to
/// the filters a run of that type gets by default; a type with no entry is not
/// benchmarkable on this machine. `supported_filters` and `supported_langs`
/// are the only allow-lists consulted when a caller overrides filters.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Machine {
    pub name: MachineName,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ip_address: Option<IpAddr>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub api_token: Option<Uuid>,
    #[serde(default)]
    pub default_filters: BTreeMap<String, FilterMap>,
    #[serde(default)]
    pub supported_filters: Vec<String>,
    #[serde(default)]
    pub supported_langs: Vec<String>,
    #[serde(default)]
    pub offline_warning_enabled: bool,
}

impl Machine {
    pub fn pipeline_name(&self) -> String {
        format!("Arrow BCI Benchmark on {}", self.name)
    }

    pub fn agent_queue(&self) -> &str {
        self.name.as_ref()
    }

    /// Resolve the filters a run of `benchmarkable_type` would get on this
    /// machine, with `override_filters` merged on top of the type's defaults
    /// (overrides win on key collision).
    ///
    /// A `Some` skip reason means the run should not happen: the type has no
    /// default filters here, the overridden `lang` is not supported, or an
    /// override key is not an accepted filter. The `lang` check fires first
    /// and alone; an invalid `lang` masks any invalid keys next to it.
    pub fn run_filters_and_skip_reason(
        &self,
        benchmarkable_type: &str,
        override_filters: Option<&FilterMap>,
    ) -> (FilterMap, Option<String>) {
        let Some(defaults) = self.default_filters.get(benchmarkable_type) else {
            return (
                FilterMap::new(),
                Some(format!(
                    "Benchmarking of {benchmarkable_type}s is not supported on {}",
                    self.name
                )),
            );
        };

        let mut filters = defaults.clone();

        let Some(overrides) = override_filters.filter(|o| !o.is_empty()) else {
            return (filters, None);
        };

        filters.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(lang) = overrides.get("lang") {
            if !self
                .supported_langs
                .iter()
                .any(|l| lang.as_str() == Some(l.as_str()))
            {
                return (
                    filters,
                    Some(format!(
                        "Only {:?} langs are supported on {}",
                        self.supported_langs, self.name
                    )),
                );
            }
        }

        if overrides
            .keys()
            .any(|k| !self.supported_filters.iter().any(|f| f == k))
        {
            return (
                filters,
                Some(format!(
                    "Only {:?} filters are supported on {}",
                    self.supported_filters, self.name
                )),
            );
        }

        (filters, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn machine() -> Machine {
        Machine {
            name: MachineName::try_from("ursa-i9").unwrap(),
            info: None,
            hostname: None,
            ip_address: None,
            port: None,
            api_token: None,
            default_filters: BTreeMap::from([(
                "commit".to_owned(),
                FilterMap::from([("lang".to_owned(), json!("Python"))]),
            )]),
            supported_filters: vec!["lang".to_owned(), "threads".to_owned()],
            supported_langs: vec!["Python".to_owned(), "Java".to_owned()],
            offline_warning_enabled: false,
        }
    }

    fn filters(pairs: &[(&str, serde_json::Value)]) -> FilterMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn unknown_benchmarkable_type_is_skipped() {
        let (run_filters, reason) = machine().run_filters_and_skip_reason("wheel", None);

        assert!(run_filters.is_empty());
        assert_eq!(
            reason.as_deref(),
            Some("Benchmarking of wheels is not supported on ursa-i9"),
        );
    }

    #[test]
    fn no_overrides_returns_the_defaults() {
        let machine = machine();
        let (run_filters, reason) = machine.run_filters_and_skip_reason("commit", None);

        assert_eq!(run_filters, filters(&[("lang", json!("Python"))]));
        assert_eq!(reason, None);
    }

    #[test]
    fn returned_filters_do_not_alias_the_stored_defaults() {
        let machine = machine();
        let (mut run_filters, _) = machine.run_filters_and_skip_reason("commit", None);

        run_filters.insert("lang".to_owned(), json!("Fortran"));

        assert_eq!(
            machine.default_filters["commit"],
            filters(&[("lang", json!("Python"))]),
        );
    }

    #[test]
    fn empty_overrides_behave_like_none() {
        let (run_filters, reason) =
            machine().run_filters_and_skip_reason("commit", Some(&FilterMap::new()));

        assert_eq!(run_filters, filters(&[("lang", json!("Python"))]));
        assert_eq!(reason, None);
    }

    #[test]
    fn valid_overrides_merge_over_the_defaults() {
        let overrides = filters(&[("lang", json!("Java")), ("threads", json!(4))]);
        let (run_filters, reason) =
            machine().run_filters_and_skip_reason("commit", Some(&overrides));

        assert_eq!(
            run_filters,
            filters(&[("lang", json!("Java")), ("threads", json!(4))]),
        );
        assert_eq!(reason, None);
    }

    #[test]
    fn unsupported_lang_is_skipped() {
        let overrides = filters(&[("lang", json!("C++"))]);
        let (run_filters, reason) =
            machine().run_filters_and_skip_reason("commit", Some(&overrides));

        assert_eq!(run_filters, filters(&[("lang", json!("C++"))]));
        assert_eq!(
            reason.as_deref(),
            Some(r#"Only ["Python", "Java"] langs are supported on ursa-i9"#),
        );
    }

    #[test]
    fn unsupported_lang_masks_unsupported_filter_keys() {
        let overrides = filters(&[("lang", json!("C++")), ("gpus", json!(2))]);
        let (_, reason) = machine().run_filters_and_skip_reason("commit", Some(&overrides));

        assert_eq!(
            reason.as_deref(),
            Some(r#"Only ["Python", "Java"] langs are supported on ursa-i9"#),
        );
    }

    #[test]
    fn non_string_lang_is_never_supported() {
        let overrides = filters(&[("lang", json!(7))]);
        let (_, reason) = machine().run_filters_and_skip_reason("commit", Some(&overrides));

        assert_eq!(
            reason.as_deref(),
            Some(r#"Only ["Python", "Java"] langs are supported on ursa-i9"#),
        );
    }

    #[test]
    fn unsupported_filter_key_is_skipped() {
        let overrides = filters(&[("lang", json!("Java")), ("gpus", json!(2))]);
        let (run_filters, reason) =
            machine().run_filters_and_skip_reason("commit", Some(&overrides));

        assert_eq!(
            run_filters,
            filters(&[("lang", json!("Java")), ("gpus", json!(2))]),
        );
        assert_eq!(
            reason.as_deref(),
            Some(r#"Only ["lang", "threads"] filters are supported on ursa-i9"#),
        );
    }

    #[test]
    fn override_wins_on_key_collision() {
        let overrides = filters(&[("lang", json!("Java"))]);
        let (run_filters, reason) =
            machine().run_filters_and_skip_reason("commit", Some(&overrides));

        assert_eq!(run_filters, filters(&[("lang", json!("Java"))]));
        assert_eq!(reason, None);
    }

    #[test]
    fn pipeline_naming_derives_from_the_machine_name() {
        let machine = machine();

        assert_eq!(machine.pipeline_name(), "Arrow BCI Benchmark on ursa-i9");
        assert_eq!(machine.agent_queue(), "ursa-i9");
    }
}
