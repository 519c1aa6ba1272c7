// Ordering comparators for sibling tasks

use super::model::Task;
use std::cmp::Ordering;

/// Ascending numeric id
pub fn by_id(a: &Task, b: &Task) -> Ordering {
    a.id.cmp(&b.id)
}

/// Ascending earliest pomodoro start; never-started tasks sort first.
/// Ties fall back to id so the order stays total.
pub fn by_start(a: &Task, b: &Task) -> Ordering {
    a.earliest_start()
        .cmp(&b.earliest_start())
        .then_with(|| by_id(a, b))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub order: SortOrder,
}

impl SortSpec {
    /// Resolve the `--ascend` / `--recent` flag pair
    ///
    /// `ascend` wins when both are set: oldest first by id. `recent` alone
    /// means most recently started first. Neither keeps ascending id order.
    pub fn from_flags(ascend: bool, recent: bool) -> Self {
        if ascend && recent {
            tracing::warn!("both --ascend and --recent given; sorting ascending");
        }
        if ascend {
            SortSpec {
                key: SortKey::Id,
                order: SortOrder::Ascending,
            }
        } else if recent {
            SortSpec {
                key: SortKey::Start,
                order: SortOrder::Descending,
            }
        } else {
            SortSpec {
                key: SortKey::Id,
                order: SortOrder::Ascending,
            }
        }
    }

    pub fn compare(&self, a: &Task, b: &Task) -> Ordering {
        let ordering = match self.key {
            SortKey::Id => by_id(a, b),
            SortKey::Start => by_start(a, b),
        };
        match self.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }

    pub fn sort(&self, tasks: &mut [Task]) {
        tasks.sort_by(|a, b| self.compare(a, b));
    }
}

/// Sort siblings by `key` in the given order
pub fn sort_tasks(tasks: &mut [Task], key: SortKey, order: SortOrder) {
    SortSpec { key, order }.sort(tasks);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::model::Pomodoro;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn task(id: u64, started_hour: Option<u32>) -> Task {
        let mut task = Task::new(format!("t{}", id), vec![], Duration::from_secs(60), 1).unwrap();
        task.id = id;
        if let Some(hour) = started_hour {
            task.pomodoros[0] = Pomodoro {
                start: Some(Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()),
                end: None,
            };
        }
        task
    }

    fn ids(tasks: &[Task]) -> Vec<u64> {
        tasks.iter().map(|t| t.id).collect()
    }

    #[test]
    fn test_by_id_ascending_and_descending() {
        let mut tasks = vec![task(3, None), task(1, None), task(2, None)];
        sort_tasks(&mut tasks, SortKey::Id, SortOrder::Ascending);
        assert_eq!(ids(&tasks), vec![1, 2, 3]);
        sort_tasks(&mut tasks, SortKey::Id, SortOrder::Descending);
        assert_eq!(ids(&tasks), vec![3, 2, 1]);
    }

    #[test]
    fn test_by_start_unstarted_sorts_earliest() {
        let mut tasks = vec![task(1, Some(10)), task(2, None), task(3, Some(8))];
        sort_tasks(&mut tasks, SortKey::Start, SortOrder::Ascending);
        assert_eq!(ids(&tasks), vec![2, 3, 1]);
    }

    #[test]
    fn test_reverse_of_ascending_equals_descending() {
        // equal start times exercise the id tie-break
        let base = vec![
            task(5, Some(9)),
            task(2, Some(9)),
            task(7, None),
            task(1, Some(11)),
            task(4, None),
        ];
        for key in [SortKey::Id, SortKey::Start] {
            let mut ascending = base.clone();
            sort_tasks(&mut ascending, key, SortOrder::Ascending);
            ascending.reverse();

            let mut descending = base.clone();
            sort_tasks(&mut descending, key, SortOrder::Descending);

            assert_eq!(ids(&ascending), ids(&descending), "key {:?}", key);
        }
    }

    #[test]
    fn test_flag_precedence() {
        assert_eq!(
            SortSpec::from_flags(true, true),
            SortSpec {
                key: SortKey::Id,
                order: SortOrder::Ascending
            }
        );
        assert_eq!(
            SortSpec::from_flags(false, true),
            SortSpec {
                key: SortKey::Start,
                order: SortOrder::Descending
            }
        );
        assert_eq!(SortSpec::from_flags(false, false).key, SortKey::Id);
    }
}
