//! Property tests for segment resolution.

use proptest::prelude::*;
use splice_core::{resolve, Checkpoint, Overrides, ProjectConfig, Segment, StudentConfig};
use splice_testkit::segment_names_strategy;
use std::collections::BTreeMap;

fn project(names: &[String]) -> ProjectConfig {
    let mut config = ProjectConfig::new();
    for name in names {
        config = config.segment(Segment::builder(name.as_str()).build());
    }
    config.checkpoint(Checkpoint::new("all").segments(names.iter().cloned()))
}

proptest! {
    #[test]
    fn replace_selects_exactly_the_listed_segments(
        names in segment_names_strategy(8),
        mask in prop::collection::vec(any::<bool>(), 8),
    ) {
        let config = project(&names);
        let chosen: Vec<String> = names
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|(name, _)| name.clone())
            .collect();
        let mut listed = chosen.clone();
        listed.reverse();
        let overrides = Overrides {
            replace: Some(listed.join(" , ")),
            checkpoint: Some("all".into()),
        };
        let resolved = resolve(&config, &overrides, || panic!("student file read")).unwrap();
        prop_assert_eq!(resolved.segment_names(), chosen);
    }

    #[test]
    fn segment_map_wins_over_checkpoint(
        names in segment_names_strategy(8),
        mask in prop::collection::vec(any::<bool>(), 8),
    ) {
        let config = project(&names);
        let switches: BTreeMap<String, bool> = names
            .iter()
            .zip(&mask)
            .map(|(name, on)| (name.clone(), *on))
            .collect();
        let expected: Vec<String> = names
            .iter()
            .filter(|name| switches[*name])
            .cloned()
            .collect();
        let student = StudentConfig {
            checkpoint: Some("all".into()),
            use_provided: true,
            segments: Some(switches),
        };
        let resolved = resolve(&config, &Overrides::default(), || Ok(student)).unwrap();
        prop_assert_eq!(resolved.segment_names(), expected);
        prop_assert_eq!(resolved.checkpoint().map(|c| c.name().to_string()), Some("all".to_string()));
    }

    #[test]
    fn use_provided_false_selects_nothing(names in segment_names_strategy(8)) {
        let config = project(&names);
        let student = StudentConfig {
            checkpoint: Some("all".into()),
            use_provided: false,
            segments: None,
        };
        let resolved = resolve(&config, &Overrides::default(), || Ok(student)).unwrap();
        prop_assert!(resolved.segments().is_empty());
    }
}
