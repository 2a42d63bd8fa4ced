//! HTML rendering.

use maud::{DOCTYPE, Markup, html};

use freebusy_core::BusyInterval;

/// What to show under the form.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// Nothing submitted yet.
    Idle,
    /// Query succeeded.
    Busy(&'a [BusyInterval]),
    /// Query failed with a user-facing message.
    Error(&'a str),
}

/// Data for the index page.
#[derive(Debug, Clone, Copy)]
pub struct FormView<'a> {
    pub calendar_id: &'a str,
    pub sdate: &'a str,
    pub edate: &'a str,
    pub outcome: Outcome<'a>,
}

impl FormView<'static> {
    /// The empty form.
    pub fn idle() -> Self {
        Self {
            calendar_id: "",
            sdate: "",
            edate: "",
            outcome: Outcome::Idle,
        }
    }
}

/// Renders the form page.
pub fn index(view: &FormView<'_>) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { "Calendar busy times" }
                link rel="stylesheet" href="/style.css";
            }
            body {
                h1 { "Calendar busy times" }
                form method="post" action="/" {
                    label for="calendarId" { "Calendar ID" }
                    input type="text" id="calendarId" name="calendarId"
                        value=(view.calendar_id) placeholder="team@example.com" required;
                    label for="sdate" { "Start (UTC)" }
                    input type="text" id="sdate" name="sdate"
                        value=(view.sdate) placeholder="2024-01-01T00:00:00Z" required;
                    label for="edate" { "End (UTC)" }
                    input type="text" id="edate" name="edate"
                        value=(view.edate) placeholder="2024-01-02T00:00:00Z" required;
                    button type="submit" { "Show busy times" }
                }
                (outcome(view.outcome))
            }
        }
    }
}

fn outcome(outcome: Outcome<'_>) -> Markup {
    match outcome {
        Outcome::Idle => html! {},
        Outcome::Busy(intervals) => busy_list(intervals),
        Outcome::Error(message) => html! {
            p.error role="alert" { "An error occurred: " (message) }
        },
    }
}

fn busy_list(intervals: &[BusyInterval]) -> Markup {
    html! {
        section.results {
            h2 { "Busy intervals" }
            @if intervals.is_empty() {
                p.empty { "No busy intervals in this range." }
            } @else {
                ul.intervals {
                    @for interval in intervals {
                        li { (interval.to_string()) }
                    }
                }
            }
        }
    }
}
