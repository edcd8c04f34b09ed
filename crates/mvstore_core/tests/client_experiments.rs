use mvstore_core::query::Filter;
use mvstore_core::{
    Collection, Entity, Experiment, FindBy, FindQuery, Model, MvClient, NewModel,
    PreconditionError, ServiceError,
};
use rusqlite::Connection;

fn stored_experiment(client: &MvClient, experiment: &Experiment) -> Experiment {
    client.service().fetch(experiment.id()).unwrap()
}

fn stored_model(client: &MvClient, model: &Model) -> Model {
    client.service().fetch(model.id()).unwrap()
}

#[test]
fn created_experiment_is_found_by_id() {
    let client = MvClient::in_memory().unwrap();
    let experiment = client.create_experiment("exp1", &["dev"]).unwrap();

    let found = client
        .find_experiment(&FindQuery::id(experiment.id()))
        .unwrap();
    assert_eq!(found, experiment);
    assert_eq!(found.name(), "exp1");
    assert_eq!(found.tags(), ["dev".to_string()]);
    assert_eq!(found.date(), experiment.date());
}

#[test]
fn tags_follow_set_semantics() {
    let client = MvClient::in_memory().unwrap();
    let service = client.service();
    let mut experiment = client.create_experiment("exp", &[] as &[&str]).unwrap();

    experiment.add_tag(service, &["a", "b"]).unwrap();
    experiment.add_tag(service, &["b", "c"]).unwrap();
    assert_eq!(experiment.tags(), ["a", "b", "c"]);

    experiment.remove_tag(service, &["a"]).unwrap();
    assert_eq!(experiment.tags(), ["b", "c"]);
    assert_eq!(stored_experiment(&client, &experiment), experiment);

    let err = experiment.remove_tag(service, &["zzz"]).unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, ServiceError::ElementNotFound { field: "tags", .. }));
    assert_eq!(experiment.tags(), ["b", "c"]);
}

#[test]
fn empty_or_blank_tag_input_is_rejected_before_the_store() {
    let client = MvClient::in_memory().unwrap();
    let mut experiment = client.create_experiment("exp", &["a"]).unwrap();

    let err = experiment
        .add_tag(client.service(), &[] as &[&str])
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    let err = experiment.add_tag(client.service(), &[" "]).unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert_eq!(stored_experiment(&client, &experiment).tags(), ["a"]);
}

#[test]
fn linkage_is_recorded_on_both_sides_and_reverts() {
    let client = MvClient::in_memory().unwrap();
    let service = client.service();
    let mut first = client.create_experiment("e1", &["t"]).unwrap();
    let mut second = client.create_experiment("e2", &["t"]).unwrap();
    let mut model = client.create_model(NewModel::new("m").tags(["v1"])).unwrap();

    first.add_model(service, &mut model).unwrap();
    assert_eq!(model.experiment_id(), Some(first.id()));
    assert_eq!(first.models(), [model.id()]);
    assert_eq!(stored_experiment(&client, &first).models(), [model.id()]);
    assert_eq!(stored_model(&client, &model).experiment_id(), Some(first.id()));

    let err = first.add_model(service, &mut model).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Precondition(PreconditionError::ModelAlreadyLinked { .. })
    ));
    let err = second.add_model(service, &mut model).unwrap_err();
    assert!(matches!(err, ServiceError::Precondition(_)));
    assert!(stored_experiment(&client, &second).models().is_empty());
    assert_eq!(first.models(), [model.id()]);

    first.remove_model(service, &mut model).unwrap();
    assert_eq!(model.experiment_id(), None);
    assert!(first.models().is_empty());
    assert!(stored_experiment(&client, &first).models().is_empty());
    assert_eq!(stored_model(&client, &model).experiment_id(), None);
}

#[test]
fn remove_model_requires_a_link_to_this_experiment() {
    let client = MvClient::in_memory().unwrap();
    let service = client.service();
    let mut first = client.create_experiment("e1", &["t"]).unwrap();
    let mut second = client.create_experiment("e2", &["t"]).unwrap();
    let mut model = client.create_model(NewModel::new("m")).unwrap();

    let err = first.remove_model(service, &mut model).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Precondition(PreconditionError::ModelNotLinked { .. })
    ));

    first.add_model(service, &mut model).unwrap();
    let err = second.remove_model(service, &mut model).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Precondition(PreconditionError::ModelNotLinked { .. })
    ));
    assert_eq!(model.experiment_id(), Some(first.id()));
}

#[test]
fn failed_second_linkage_step_leaves_store_and_memory_unchanged() {
    let client = MvClient::in_memory().unwrap();
    let service = client.service();
    let mut first = client.create_experiment("e1", &["t"]).unwrap();
    let mut second = client.create_experiment("e2", &["t"]).unwrap();
    let mut model = client.create_model(NewModel::new("m")).unwrap();
    let mut stale_copy = stored_model(&client, &model);

    first.add_model(service, &mut model).unwrap();

    let err = second.add_model(service, &mut stale_copy).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Precondition(PreconditionError::ModelAlreadyLinked { experiment_id, .. })
            if experiment_id == first.id()
    ));
    assert!(second.models().is_empty());
    assert_eq!(stale_copy.experiment_id(), None);
    assert!(stored_experiment(&client, &second).models().is_empty());
    assert_eq!(stored_model(&client, &model).experiment_id(), Some(first.id()));
}

#[test]
fn linking_a_deleted_model_rolls_back_the_experiment_side() {
    let client = MvClient::in_memory().unwrap();
    let service = client.service();
    let mut experiment = client.create_experiment("e1", &["t"]).unwrap();
    let mut model = client.create_model(NewModel::new("m")).unwrap();
    model.clone().delete(service).unwrap();

    let err = experiment.add_model(service, &mut model).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::NotFound {
            collection: Collection::Models,
            ..
        }
    ));
    assert!(experiment.models().is_empty());
    assert!(stored_experiment(&client, &experiment).models().is_empty());
}

#[test]
fn removing_a_deleted_model_drops_its_id_from_the_experiment() {
    let client = MvClient::in_memory().unwrap();
    let service = client.service();
    let mut experiment = client.create_experiment("e1", &["t"]).unwrap();
    let mut model = client.create_model(NewModel::new("m")).unwrap();
    experiment.add_model(service, &mut model).unwrap();
    model.clone().delete(service).unwrap();
    assert_eq!(stored_experiment(&client, &experiment).models(), [model.id()]);

    experiment.remove_model(service, &mut model).unwrap();

    assert!(experiment.models().is_empty());
    assert_eq!(model.experiment_id(), None);
    assert!(stored_experiment(&client, &experiment).models().is_empty());
}

#[test]
fn conflicting_and_ambiguous_queries_are_rejected() {
    let client = MvClient::in_memory().unwrap();
    client.create_experiment("same", &["a"]).unwrap();
    client.create_experiment("same", &["b"]).unwrap();

    let conflicting = FindQuery {
        find_by: Some(FindBy::Name("same".to_string())),
        filter: Some(Filter::All),
    };
    assert!(matches!(
        client.find_experiments(&conflicting),
        Err(ServiceError::ConflictingQuery)
    ));

    let err = client.find_experiment(&FindQuery::name("same")).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::AmbiguousResult { matched: 2, .. }
    ));
    assert_eq!(
        client
            .find_experiments(&FindQuery::name("same"))
            .unwrap()
            .len(),
        2
    );

    let err = client
        .find_experiment(&FindQuery::default())
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[test]
fn find_selectors_cover_tags_date_and_raw_filters() {
    let client = MvClient::in_memory().unwrap();
    let first = client.create_experiment("a", &["vision"]).unwrap();
    let second = client.create_experiment("b", &["nlp"]).unwrap();

    let by_tag = client.find_experiments(&FindQuery::tags(["nlp", "audio"])).unwrap();
    assert_eq!(by_tag, vec![second.clone()]);

    let before_second = client
        .find_experiments(&FindQuery::date_before(second.date() + 1))
        .unwrap();
    assert!(before_second.contains(&first));

    let raw = client
        .find_experiment(&FindQuery::raw(Filter::eq("name", "a")))
        .unwrap();
    assert_eq!(raw, first);

    let err = client
        .find_experiments(&FindQuery::tags(["missing"]))
        .unwrap_err();
    assert!(matches!(err, ServiceError::EmptyResult { .. }));
}

#[test]
fn list_pages_follow_insertion_order() {
    let client = MvClient::in_memory().unwrap();
    let names: Vec<String> = (0..5).map(|i| format!("exp{i}")).collect();
    for name in &names {
        client.create_experiment(name, &["t"]).unwrap();
    }

    let page = client.list_experiments(2, 1).unwrap();
    let page_names: Vec<&str> = page.iter().map(|experiment| experiment.name()).collect();
    assert_eq!(page_names, ["exp2", "exp3"]);
    assert_eq!(client.list_experiments(2, 2).unwrap().len(), 1);
    assert!(client.list_experiments(2, 3).unwrap().is_empty());
    assert_eq!(
        client
            .list_experiments(mvstore_core::DEFAULT_PAGE_SIZE, 0)
            .unwrap()
            .len(),
        5
    );
}

#[test]
fn deleting_an_experiment_does_not_cascade() {
    let client = MvClient::in_memory().unwrap();
    let service = client.service();
    let mut experiment = client.create_experiment("e1", &["t"]).unwrap();
    let mut model = client.create_model(NewModel::new("m")).unwrap();
    experiment.add_model(service, &mut model).unwrap();
    let experiment_id = experiment.id();

    experiment.delete(service).unwrap();

    let orphan = stored_model(&client, &model);
    assert_eq!(orphan.experiment_id(), Some(experiment_id));
    assert!(client
        .find_experiment(&FindQuery::id(experiment_id))
        .unwrap_err()
        .is_not_found());
}

#[test]
fn stale_reference_updates_fail_with_not_found() {
    let client = MvClient::in_memory().unwrap();
    let service = client.service();
    let experiment = client.create_experiment("e1", &["t"]).unwrap();
    let mut stale = experiment.clone();
    experiment.delete(service).unwrap();

    let err = stale.rename(service, "renamed").unwrap_err();
    assert!(matches!(
        err,
        ServiceError::NotFound {
            collection: Collection::Experiments,
            ..
        }
    ));
    assert_eq!(stale.name(), "e1");
    assert!(stale.clone().delete(service).unwrap_err().is_not_found());
}

#[test]
fn rename_to_same_name_is_accepted() {
    let client = MvClient::in_memory().unwrap();
    let mut experiment = client.create_experiment("e1", &["t"]).unwrap();

    experiment.rename(client.service(), "e1").unwrap();
    assert!(matches!(
        experiment.rename(client.service(), "  ").unwrap_err(),
        ServiceError::Validation(_)
    ));
    assert_eq!(experiment.name(), "e1");
}

#[test]
fn create_link_rename_find_delete_scenario() {
    let client = MvClient::in_memory().unwrap();
    let service = client.service();
    let mut exp1 = client.create_experiment("exp1", &["dev"]).unwrap();
    let mut m1 = client.create_model(NewModel::new("m1").tags(["v1"])).unwrap();

    exp1.add_model(service, &mut m1).unwrap();
    assert_eq!(m1.experiment_id(), Some(exp1.id()));

    exp1.rename(service, "exp1-renamed").unwrap();
    let found = client
        .find_experiment(&FindQuery::name("exp1-renamed"))
        .unwrap();
    assert_eq!(found.id(), exp1.id());
    assert_eq!(found.models(), [m1.id()]);

    let m1_id = m1.id();
    m1.delete(service).unwrap();
    let err = client.find_model(&FindQuery::id(m1_id)).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn busy_store_fails_with_store_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("busy.db");
    let client = MvClient::connect(&format!("sqlite://{}?timeout_ms=50", path.display())).unwrap();

    let blocker = Connection::open(&path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE;").unwrap();

    let err = client.create_experiment("blocked", &["t"]).unwrap_err();
    assert!(matches!(err, ServiceError::StoreTimeout(_)), "got {err}");

    blocker.execute_batch("ROLLBACK;").unwrap();
    client.create_experiment("unblocked", &["t"]).unwrap();
}

#[test]
fn malformed_connection_string_is_a_config_error() {
    assert!(matches!(
        MvClient::connect("postgres://localhost/db"),
        Err(ServiceError::Config(_))
    ));
    assert!(matches!(
        MvClient::connect("sqlite::memory:?retries=3"),
        Err(ServiceError::Config(_))
    ));
}
