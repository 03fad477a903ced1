//! This file defines the API routes.

use axum::{
    Router, middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};

use crate::{
    AppState, Error,
    auth::user_guard,
    category::{create_category_endpoint, get_categories_endpoint},
    dashboard::get_dashboard_endpoint,
    endpoints,
    goal::{
        add_to_goal_endpoint, create_goal_endpoint, delete_goal_endpoint, get_goals_endpoint,
        update_goal_endpoint,
    },
    transaction::{
        create_occurrence_endpoint, create_template_endpoint, delete_occurrence_endpoint,
        delete_template_endpoint, get_template_endpoint, list_occurrences_endpoint,
        list_templates_endpoint, template_history_endpoint, update_occurrence_endpoint,
        update_template_endpoint,
    },
};

/// Return a router with all the app's routes.
///
/// Every route requires the [crate::USER_ID_HEADER] header.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            endpoints::TRANSACTIONS,
            get(list_occurrences_endpoint).post(create_occurrence_endpoint),
        )
        .route(
            endpoints::TRANSACTION,
            put(update_occurrence_endpoint).delete(delete_occurrence_endpoint),
        )
        .route(
            endpoints::TEMPLATES,
            get(list_templates_endpoint).post(create_template_endpoint),
        )
        .route(
            endpoints::TEMPLATE,
            get(get_template_endpoint)
                .put(update_template_endpoint)
                .delete(delete_template_endpoint),
        )
        .route(endpoints::TEMPLATE_HISTORY, get(template_history_endpoint))
        .route(
            endpoints::CATEGORIES,
            get(get_categories_endpoint).post(create_category_endpoint),
        )
        .route(endpoints::DASHBOARD, get(get_dashboard_endpoint))
        .route(
            endpoints::GOALS,
            get(get_goals_endpoint).post(create_goal_endpoint),
        )
        .route(
            endpoints::GOAL,
            put(update_goal_endpoint).delete(delete_goal_endpoint),
        )
        .route(endpoints::GOAL_ADD, post(add_to_goal_endpoint))
        .fallback(get_404_not_found)
        .layer(middleware::from_fn(user_guard))
        .with_state(state)
}

async fn get_404_not_found() -> Response {
    Error::NotFound.into_response()
}
