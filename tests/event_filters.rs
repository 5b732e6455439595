mod common;

use std::collections::BTreeSet;

use common::*;
use eventhub::error::AppError;
use eventhub::events;
use eventhub::models::{Constraint, EventFilter, EventProperty, EventStatus, EventType, PaymentType};

fn sorted(events: &[eventhub::models::EventAggregate]) -> Vec<&str> {
    let mut titles = titles(events);
    titles.sort();
    titles
}

#[tokio::test]
async fn empty_filter_returns_everything_by_start_time() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    create(&app, &organizer, between("late", "2025-07-01T10:00:00Z", None)).await;
    create(&app, &organizer, between("early", "2025-05-01T10:00:00Z", None)).await;
    create(&app, &organizer, between("middle", "2025-06-01T10:00:00Z", None)).await;

    let all = events::all_events(&app.state, &EventFilter::default())
        .await
        .unwrap();
    assert_eq!(titles(&all), ["early", "middle", "late"]);
}

#[tokio::test]
async fn price_range_with_currency_keeps_free_events() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    create(&app, &organizer, paid("usd", 50.0, "USD")).await;
    create(&app, &organizer, paid("eur", 50.0, "EUR")).await;
    create(&app, &organizer, paid("pricey", 500.0, "USD")).await;
    create(&app, &organizer, free("free")).await;

    let filter = EventFilter {
        price_range: Some((Some(0.0), Some(100.0))),
        currency: Some(Constraint::Only("USD".to_string())),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &filter).await.unwrap();
    assert_eq!(sorted(&found), ["free", "usd"]);
}

#[tokio::test]
async fn positive_minimum_excludes_free_events() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    create(&app, &organizer, paid("cheap", 5.0, "BYN")).await;
    create(&app, &organizer, paid("ten", 10.0, "USD")).await;
    create(&app, &organizer, paid("more", 30.0, "EUR")).await;
    create(&app, &organizer, free("free")).await;

    let filter = EventFilter {
        price_range: Some((Some(10.0), None)),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &filter).await.unwrap();
    assert_eq!(sorted(&found), ["more", "ten"]);
}

#[tokio::test]
async fn maximum_only_excludes_free_events() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    create(&app, &organizer, paid("cheap", 5.0, "BYN")).await;
    create(&app, &organizer, paid("pricey", 50.0, "BYN")).await;
    create(&app, &organizer, free("free")).await;

    let filter = EventFilter {
        price_range: Some((None, Some(30.0))),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &filter).await.unwrap();
    assert_eq!(titles(&found), ["cheap"]);

    let with_currency = EventFilter {
        price_range: Some((None, Some(30.0))),
        currency: Some(Constraint::Only("BYN".to_string())),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &with_currency).await.unwrap();
    assert_eq!(titles(&found), ["cheap"]);
}

#[tokio::test]
async fn currency_alone_keeps_free_events() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    create(&app, &organizer, paid("usd", 50.0, "USD")).await;
    create(&app, &organizer, paid("eur", 50.0, "EUR")).await;
    create(&app, &organizer, free("free")).await;

    let filter = EventFilter {
        currency: Some(Constraint::Only("EUR".to_string())),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &filter).await.unwrap();
    assert_eq!(sorted(&found), ["eur", "free"]);

    let any = EventFilter {
        currency: Some(Constraint::Any),
        ..Default::default()
    };
    assert_eq!(events::all_events(&app.state, &any).await.unwrap().len(), 3);
}

#[tokio::test]
async fn free_events_are_stored_without_price() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    let mut input = free("free");
    input.price = Some(99.0);
    input.currency = Some("USD".to_string());
    let event = create(&app, &organizer, input).await;

    assert_eq!(event.payment_type, PaymentType::Free);
    assert_eq!(event.price, None);
    assert_eq!(event.currency, None);
}

#[tokio::test]
async fn properties_use_superset_containment() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    create(
        &app,
        &organizer,
        with_properties(
            "picnic",
            &[
                EventProperty::Outdoor,
                EventProperty::FamilyFriendly,
                EventProperty::FreeEntry,
            ],
        ),
    )
    .await;
    create(&app, &organizer, with_properties("hike", &[EventProperty::Outdoor])).await;
    create(&app, &organizer, with_properties("bare", &[])).await;

    let filter = EventFilter {
        event_properties: Some(BTreeSet::from([
            EventProperty::Outdoor,
            EventProperty::FamilyFriendly,
        ])),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &filter).await.unwrap();
    assert_eq!(titles(&found), ["picnic"]);
}

#[tokio::test]
async fn date_range_from_start_intersects_intervals() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    create(&app, &organizer, between("ongoing", "2025-05-01T10:00:00Z", None)).await;
    create(
        &app,
        &organizer,
        between("april", "2025-04-05T10:00:00Z", Some("2025-04-06T10:00:00Z")),
    )
    .await;
    create(
        &app,
        &organizer,
        between("spanning", "2025-05-20T10:00:00Z", Some("2025-06-03T10:00:00Z")),
    )
    .await;
    create(&app, &organizer, between("later", "2025-06-15T10:00:00Z", None)).await;

    let filter = EventFilter {
        date_range: Some((Some("2025-06-01".to_string()), None)),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &filter).await.unwrap();
    assert_eq!(titles(&found), ["ongoing", "spanning", "later"]);
}

#[tokio::test]
async fn closed_date_range_excludes_events_outside_it() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    create(
        &app,
        &organizer,
        between("before", "2025-05-01T10:00:00Z", Some("2025-05-02T10:00:00Z")),
    )
    .await;
    create(
        &app,
        &organizer,
        between("inside", "2025-06-05T10:00:00Z", Some("2025-06-05T12:00:00Z")),
    )
    .await;
    create(&app, &organizer, between("after", "2025-07-01T10:00:00Z", None)).await;
    create(&app, &organizer, between("open", "2025-05-15T10:00:00Z", None)).await;

    let filter = EventFilter {
        date_range: Some((
            Some("2025-06-01T00:00:00Z".to_string()),
            Some("2025-06-30T23:59:59Z".to_string()),
        )),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &filter).await.unwrap();
    assert_eq!(titles(&found), ["open", "inside"]);
}

#[tokio::test]
async fn malformed_dates_are_rejected_before_querying() {
    let app = test_app().await;
    let filter = EventFilter {
        date_range: Some((Some("next tuesday".to_string()), None)),
        ..Default::default()
    };
    let err = events::all_events(&app.state, &filter).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));
}

#[tokio::test]
async fn location_and_search_match_case_insensitively() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    let mut gomel = event_input("Jazz Night");
    gomel.city = Some("Gomel".to_string());
    gomel.address = "Sovetskaya 10".to_string();
    create(&app, &organizer, gomel).await;
    create(&app, &organizer, event_input("Rock Evening")).await;

    let by_city = EventFilter {
        location: Some("gom".to_string()),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &by_city).await.unwrap();
    assert_eq!(titles(&found), ["Jazz Night"]);

    let by_address = EventFilter {
        location: Some("sovetskaya".to_string()),
        ..Default::default()
    };
    assert_eq!(events::all_events(&app.state, &by_address).await.unwrap().len(), 1);

    let by_text = EventFilter {
        search_query: Some("rock evening desc".to_string()),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &by_text).await.unwrap();
    assert_eq!(titles(&found), ["Rock Evening"]);
}

#[tokio::test]
async fn cyrillic_text_matches_case_insensitively() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    let mut jazz = event_input("Концерт джаза");
    jazz.city = Some("Минск".to_string());
    jazz.address = "Проспект Независимости 1".to_string();
    let jazz = create(&app, &organizer, jazz).await;
    create(&app, &organizer, event_input("Rock Evening")).await;

    let by_text = EventFilter {
        search_query: Some("концерт".to_string()),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &by_text).await.unwrap();
    assert_eq!(titles(&found), ["Концерт джаза"]);

    let by_city = EventFilter {
        location: Some("минск".to_string()),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &by_city).await.unwrap();
    assert_eq!(titles(&found), ["Концерт джаза"]);

    let mut renamed = event_input("ФЕСТИВАЛЬ");
    renamed.city = Some("Минск".to_string());
    renamed.address = "Проспект Независимости 1".to_string();
    events::update_event(&app.state, &jazz.id, renamed, &organizer.id, Vec::new())
        .await
        .unwrap();
    let by_new_title = EventFilter {
        search_query: Some("фестиваль".to_string()),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &by_new_title).await.unwrap();
    assert_eq!(titles(&found), ["ФЕСТИВАЛЬ"]);
}

#[tokio::test]
async fn search_wildcards_match_literally() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    create(&app, &organizer, event_input("100% vinyl")).await;
    create(&app, &organizer, event_input("1000 vinyls")).await;

    let filter = EventFilter {
        search_query: Some("100%".to_string()),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &filter).await.unwrap();
    assert_eq!(titles(&found), ["100% vinyl"]);
}

#[tokio::test]
async fn verified_only_follows_the_organizer() {
    let app = test_app().await;
    let verified = verified_user(&app, "club").await;
    let casual = user(&app, "neighbour").await;
    create(&app, &verified, event_input("official")).await;
    create(&app, &casual, event_input("garage")).await;

    let filter = EventFilter {
        verified_only: Some(true),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &filter).await.unwrap();
    assert_eq!(titles(&found), ["official"]);
    assert!(found[0].organizer.is_verified);
    assert!(found[0].is_verified);
}

#[tokio::test]
async fn exact_dimensions_and_status_sentinel() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    let mut workshop = event_input("workshop");
    workshop.event_type = EventType::Workshop;
    workshop.payment_type = PaymentType::Donation;
    create(&app, &organizer, workshop).await;
    let concert = create(&app, &organizer, event_input("concert")).await;

    sqlx::query("UPDATE events SET status = ? WHERE id = ?")
        .bind(EventStatus::Cancelled)
        .bind(&concert.id)
        .execute(&app.state.pool)
        .await
        .unwrap();

    let by_type = EventFilter {
        event_type: Some(EventType::Workshop),
        payment_type: Some(PaymentType::Donation),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &by_type).await.unwrap();
    assert_eq!(titles(&found), ["workshop"]);

    let cancelled = EventFilter {
        status: Some(Constraint::Only(EventStatus::Cancelled)),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &cancelled).await.unwrap();
    assert_eq!(titles(&found), ["concert"]);

    let any = EventFilter {
        status: Some(Constraint::Any),
        ..Default::default()
    };
    assert_eq!(events::all_events(&app.state, &any).await.unwrap().len(), 2);
}

#[tokio::test]
async fn organizer_and_age_restriction_filters() {
    let app = test_app().await;
    let anna = user(&app, "anna").await;
    let boris = user(&app, "boris").await;
    let mut adults = event_input("adults");
    adults.age_restriction = Some(18);
    create(&app, &anna, adults).await;
    create(&app, &boris, event_input("everyone")).await;

    let by_organizer = EventFilter {
        organizer_id: Some(boris.id.clone()),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &by_organizer).await.unwrap();
    assert_eq!(titles(&found), ["everyone"]);

    let for_teens = EventFilter {
        age_restriction: Some(16),
        ..Default::default()
    };
    let found = events::all_events(&app.state, &for_teens).await.unwrap();
    assert_eq!(titles(&found), ["everyone"]);
}

#[tokio::test]
async fn aggregate_carries_location_organizer_and_participants() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    let event = create(&app, &organizer, event_input("meetup")).await;

    assert_eq!(event.location.city, "Minsk");
    assert_eq!(event.location.coordinates, MINSK);
    assert_eq!(event.organizer.username, "anna");
    assert_eq!(event.organizer.display_name, "anna");
    assert_eq!(event.status, EventStatus::Upcoming);
    assert_eq!(
        event.participants.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
        [organizer.id.as_str()]
    );
    assert!(event.favorited_by.is_empty());
}

#[tokio::test]
async fn display_name_falls_back_to_username() {
    let app = test_app().await;
    let organizer = user(&app, "anna").await;
    sqlx::query("UPDATE users SET display_name = '' WHERE id = ?")
        .bind(&organizer.id)
        .execute(&app.state.pool)
        .await
        .unwrap();
    let event = create(&app, &organizer, event_input("meetup")).await;
    assert_eq!(event.organizer.display_name, "anna");
    assert_eq!(event.participants[0].display_name, "anna");
}
