//! The API endpoints URIs.
//!
//! For endpoints that take parameters, e.g., '/api/templates/{kind}/{template_id}', use [format_endpoint].

/// The route to list and book incomes or expenses.
pub const TRANSACTIONS: &str = "/api/transactions/{kind}";
/// The route to update or delete a booked income or expense.
pub const TRANSACTION: &str = "/api/transactions/{kind}/{transaction_id}";
/// The route to list and create recurring incomes or expenses.
pub const TEMPLATES: &str = "/api/templates/{kind}";
/// The route to get, update or delete a recurring income or expense.
pub const TEMPLATE: &str = "/api/templates/{kind}/{template_id}";
/// The route to the occurrence history of a recurring income or expense.
pub const TEMPLATE_HISTORY: &str = "/api/templates/{kind}/{template_id}/history";
/// The route to list and create categories.
pub const CATEGORIES: &str = "/api/categories";
/// The route to the monthly summary.
pub const DASHBOARD: &str = "/api/dashboard";
/// The route to list and create savings goals.
pub const GOALS: &str = "/api/goals";
/// The route to update or delete a savings goal.
pub const GOAL: &str = "/api/goals/{goal_id}";
/// The route to add money to a savings goal.
pub const GOAL_ADD: &str = "/api/goals/{goal_id}/add";

/// Replace the parameters in `endpoint_path` with `params`, in order.
///
/// A parameter is a string that starts with a left brace and ends with a
/// right brace. For example, in the endpoint path '/api/goals/{goal_id}',
/// '{goal_id}' is the parameter.
///
/// Parameters without a matching entry in `params` are left as is.
pub fn format_endpoint(endpoint_path: &str, params: &[&str]) -> String {
    let mut formatted = String::with_capacity(endpoint_path.len());
    let mut params = params.iter();
    let mut rest = endpoint_path;

    while let Some(start) = rest.find('{') {
        let Some(length) = rest[start..].find('}') else {
            break;
        };
        let Some(param) = params.next() else {
            break;
        };

        formatted.push_str(&rest[..start]);
        formatted.push_str(param);
        rest = &rest[start + length + 1..];
    }

    formatted.push_str(rest);
    formatted
}
