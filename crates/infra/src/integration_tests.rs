//! Integration tests for aggregates over the in-memory mapper.
//!
//! Tests: Mapper → Aggregate → persistence → rehydration
//!
//! Verifies:
//! - Lazy loading and pagination go through single bulk fetches
//! - Stored aggregates keep only membership and rehydrate through the registry
//! - Snapshot/restore undoes the last mutation while the mapper sees every change

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mapperkit_core::{
        Aggregate, Entity, FieldValue, LoadPolicy, Mapper, Prototype, Record, Restorable, record,
    };

    use crate::config::MapperConfig;
    use crate::document::{DocumentDependency, DocumentError};
    use crate::mapper::{InMemoryMapper, MapperError};
    use crate::registry::InMemoryMapperRegistry;

    type Articles = InMemoryMapper<i64>;

    fn setup(count: i64) -> Articles {
        mapperkit_observability::init_for_tests();

        let mapper = InMemoryMapper::<i64>::new(
            MapperConfig::default()
                .with_kind("article")
                .with_items_per_page(3),
        )
        .with_computed("title_len", |fields: &Record| {
            let len = fields
                .get("title")
                .and_then(FieldValue::as_str)
                .map_or(0, str::len);
            FieldValue::Int(len as i64)
        });

        for id in 1..=count {
            mapper
                .insert(record([
                    ("id", FieldValue::Int(id)),
                    ("title", format!("article {id}").into()),
                    ("rating", FieldValue::Float(id as f64 / 2.0)),
                    ("published", (id % 2 == 1).into()),
                ]))
                .unwrap();
        }
        mapper
    }

    fn ids(aggregate: &Aggregate<Articles>) -> Vec<i64> {
        aggregate.iter().map(|e| *e.id()).collect()
    }

    #[test]
    fn pages_load_through_single_fetches() {
        let mapper = setup(8);
        let mut aggregate = mapper
            .create_aggregate((1..=8).collect(), None, LoadPolicy::Lazy)
            .unwrap();

        aggregate.load_entities_for_current_page(2, None).unwrap();
        assert_eq!(ids(&aggregate), vec![4, 5, 6]);
        assert_eq!(aggregate.total_count(), 8);

        aggregate.load_entities_for_current_page(3, None).unwrap();
        assert_eq!(aggregate.count(), 5);

        let stats = mapper.stats();
        assert_eq!(stats.fetches, 2);
        assert_eq!(stats.fetched_ids, 5);
    }

    #[test]
    fn keyed_aggregate_is_stored_on_every_mutation() {
        let mapper = setup(3);
        let key = mapper.aggregate_cache_key("front-page");
        let mut aggregate = mapper
            .create_aggregate(vec![1, 2], Some(key.clone()), LoadPolicy::Eager)
            .unwrap();

        let third = mapper.get(&3).unwrap();
        aggregate.push(third.clone()).unwrap();
        let stored = mapper.stored_aggregate(&key).unwrap().unwrap();
        assert_eq!(stored.full_ids, vec![1, 2, 3]);
        assert_eq!(stored.kind, "article");

        aggregate.remove(&third).unwrap();
        let stored = mapper.stored_aggregate(&key).unwrap().unwrap();
        assert_eq!(stored.full_ids, vec![1, 2]);
        assert_eq!(mapper.stats().aggregate_updates, 2);
    }

    #[test]
    fn derived_aggregates_are_not_stored() {
        let mapper = setup(4);
        let aggregate = mapper
            .create_aggregate((1..=4).collect(), None, LoadPolicy::Eager)
            .unwrap();

        let mut published = aggregate
            .filter(&record([("published", true)]), &Record::new())
            .unwrap()
            .into_owned();
        assert_eq!(published.full_ids(), &[1, 3]);
        assert_eq!(published.cache_key(), None);

        published.push(mapper.get(&2).unwrap()).unwrap();
        assert_eq!(mapper.stats().aggregate_updates, 1);
        assert!(mapper.stored_aggregate("anything").unwrap().is_none());
    }

    #[test]
    fn stored_aggregate_rehydrates_through_registry() {
        let articles = setup(5);
        let registry = Arc::new(InMemoryMapperRegistry::new());
        registry.register(articles.clone());
        registry.register(InMemoryMapper::<i64>::new(MapperConfig::default().with_kind("comment")));
        assert_eq!(registry.kinds(), vec!["article", "comment"]);

        let aggregate = articles
            .create_aggregate(vec![5, 3, 1], Some("article:aggregate:odd".into()), LoadPolicy::Eager)
            .unwrap();
        let json = aggregate.to_json().unwrap();

        let lazy = Aggregate::<Articles>::from_json(&json, &registry, LoadPolicy::Lazy).unwrap();
        assert_eq!(lazy.full_ids(), &[5, 3, 1]);
        assert_eq!(lazy.count(), 0);
        assert_eq!(lazy.cache_key(), Some("article:aggregate:odd"));

        let eager = Aggregate::<Articles>::from_json(&json, &registry, LoadPolicy::Eager).unwrap();
        assert_eq!(ids(&eager), vec![5, 3, 1]);
    }

    #[test]
    fn mapper_reloads_its_own_stored_aggregates() {
        let mapper = setup(3);
        let mut aggregate = mapper
            .create_aggregate(vec![1], Some("k".into()), LoadPolicy::Lazy)
            .unwrap();
        aggregate.push(mapper.get(&2).unwrap()).unwrap();

        let reloaded = mapper.load_aggregate("k", LoadPolicy::Lazy).unwrap().unwrap();
        assert_eq!(reloaded.full_ids(), &[1, 2]);
        assert!(mapper.load_aggregate("missing", LoadPolicy::Lazy).unwrap().is_none());
    }

    #[test]
    fn unknown_kind_fails_rehydration() {
        let registry: InMemoryMapperRegistry<Articles> = InMemoryMapperRegistry::new();
        let err = Aggregate::<Articles>::from_json(
            r#"{"kind":"article","full_ids":[1]}"#,
            &registry,
            LoadPolicy::Lazy,
        )
        .unwrap_err();
        assert!(matches!(err, MapperError::Aggregate(_)));
    }

    #[test]
    fn cache_tags_switch_source_once_fully_loaded() {
        let mapper = setup(3);
        let mut aggregate = mapper
            .create_aggregate(vec![1, 2, 3], None, LoadPolicy::Lazy)
            .unwrap();

        assert_eq!(
            aggregate.cache_tags().unwrap(),
            vec!["article:1", "article:2", "article:3"]
        );
        assert_eq!(mapper.stats().tag_lookups, 1);

        aggregate.load_entities().unwrap();
        let mut tags = aggregate.cache_tags().unwrap();
        tags.sort();
        assert_eq!(tags, vec!["article:1", "article:2", "article:3"]);
        assert_eq!(mapper.stats().tag_lookups, 1);
    }

    #[test]
    fn sort_on_float_field_with_ties() {
        let mapper = setup(3);
        mapper.get(&1).unwrap().update(&record([("rating", 1.0)])).unwrap();
        let mut aggregate = mapper
            .create_aggregate(vec![1, 2, 3], None, LoadPolicy::Eager)
            .unwrap();

        aggregate.sort("rating", false);
        // Ratings: 1 -> 1.0, 2 -> 1.0, 3 -> 1.5. Ties keep fetch order.
        assert_eq!(ids(&aggregate), vec![3, 1, 2]);
    }

    #[test]
    fn computed_fields_and_parent_dependencies_preload() {
        let mapper = setup(2);
        mapper
            .insert(record([
                ("id", FieldValue::Int(3)),
                ("title", "reply".into()),
                ("parent_id", FieldValue::Int(1)),
            ]))
            .unwrap();
        let aggregate = mapper
            .create_aggregate(vec![1, 3], None, LoadPolicy::Eager)
            .unwrap();

        aggregate.preload_computed_for_entities(&["title_len"]).unwrap();
        aggregate
            .preload_dependency_by_callback(DocumentDependency::Parent)
            .unwrap();

        let reply = aggregate.get_entity_by_id(&3).unwrap();
        assert_eq!(reply.field("title_len"), Some(FieldValue::Int(5)));
        assert_eq!(reply.parent().map(|p| *p.id()), Some(1));

        let err = aggregate
            .preload_computed_for_entities(&["word_count"])
            .unwrap_err();
        assert!(matches!(err, MapperError::Document(DocumentError::UnknownComputed(_))));
    }

    #[test]
    fn bulk_update_and_delete() {
        let mapper = setup(4);
        let mut aggregate = mapper
            .create_aggregate(vec![1, 2, 3], None, LoadPolicy::Lazy)
            .unwrap();
        aggregate.load_entities_by_ids(&[1]).unwrap();

        aggregate.update(&record([("title", "edited")])).unwrap();
        assert_eq!(mapper.get(&1).unwrap().field("title"), Some("edited".into()));
        assert_eq!(mapper.get(&2).unwrap().field("title"), Some("article 2".into()));

        let results = aggregate.delete().unwrap();
        assert_eq!(results, vec![true, true, true]);
        assert_eq!(mapper.len(), 1);
        assert!(mapper.get(&4).is_some());
    }

    #[test]
    fn structured_prototypes_skip_the_fetch() {
        let mapper = setup(3);
        let prototypes = vec![
            Prototype::Record(record([("id", FieldValue::Int(1)), ("title", "cached".into())])),
            Prototype::Id(2),
        ];
        let aggregate = mapper
            .create_aggregate_from_prototypes(prototypes, None, LoadPolicy::Lazy)
            .unwrap();

        assert_eq!(aggregate.count(), 1);
        assert_eq!(
            aggregate.get_entity_by_id(&1).unwrap().field("title"),
            Some("cached".into())
        );
        assert_eq!(mapper.stats().fetches, 0);

        let bad = vec![Prototype::Record(record([("title", "orphan")]))];
        assert!(matches!(
            mapper.create_aggregate_from_prototypes(bad, None, LoadPolicy::Lazy),
            Err(MapperError::Aggregate(_))
        ));
    }

    #[test]
    fn transaction_rollback_restores_membership() {
        let mapper = setup(4);
        let key = mapper.aggregate_cache_key("tx");
        let mut aggregate = mapper
            .create_aggregate(vec![1, 2], Some(key.clone()), LoadPolicy::Eager)
            .unwrap();
        assert_eq!(aggregate.object_identifier(), key);

        aggregate.unshift(mapper.get(&4).unwrap()).unwrap();
        assert_eq!(aggregate.full_ids(), &[4, 1, 2]);

        // Coordinator rolls back and persists the restored membership.
        let state = aggregate.object_state().unwrap();
        aggregate.restore_object_state(state);
        mapper.update_aggregate(&aggregate).unwrap();

        assert_eq!(aggregate.full_ids(), &[1, 2]);
        assert_eq!(mapper.stored_aggregate(&key).unwrap().unwrap().full_ids, vec![1, 2]);
    }

    #[test]
    fn rollback_of_remove_keeps_documents_loaded() {
        let mapper = setup(3);
        let mut aggregate = mapper
            .create_aggregate(vec![1, 2, 3], Some("k".into()), LoadPolicy::Eager)
            .unwrap();
        let before = aggregate.current_state();
        let second = mapper.get(&2).unwrap();

        aggregate.remove(&second).unwrap();
        let state = aggregate.object_state().unwrap();
        aggregate.restore_object_state(state);

        assert_eq!(aggregate.current_state(), before);
        assert!(Arc::ptr_eq(aggregate.get_entity_by_id(&2).unwrap(), &second));
        assert_eq!(mapper.stats().fetches, 1);
    }

    #[test]
    fn combine_and_recircle_across_aggregates() {
        let mapper = setup(5);
        let a = mapper.create_aggregate(vec![1, 2], None, LoadPolicy::Lazy).unwrap();
        let b = mapper.create_aggregate(vec![2, 3], None, LoadPolicy::Lazy).unwrap();

        let combined = Aggregate::combine(&mapper, [&a, &b], None).unwrap();
        assert_eq!(combined.full_ids(), &[1, 2, 2, 3]);

        let whole = mapper.create_aggregate((1..=5).collect(), None, LoadPolicy::Lazy).unwrap();
        let rotated = whole.recircle(3).unwrap();
        assert_eq!(rotated.full_ids(), &[3, 4, 5, 1, 2]);
        assert!(rotated.is_fully_loaded());
        assert_eq!(rotated.to_string(), "article of 5 element(s)");
    }
}
