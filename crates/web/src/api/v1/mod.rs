use axum::{routing::on, Router};
use locator::database::Database;

use crate::{
    common::{route_not_found, METHOD_FILTER_ALL},
    WebState,
};

mod stations;

pub(crate) fn routes<D: Database>(state: WebState<D>) -> Router {
    Router::new()
        .nest_service("/stations", stations::routes(state))
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}
