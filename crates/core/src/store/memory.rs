use super::{
    check_swap, sort_recent_first, CarePlanStore, ChangeContext, RevisionRecord,
};
use crate::careplan::{CarePlan, CarePlanStatus, VersionStamp};
use crate::{CarePlanError, CarePlanResult, ShardableUuid};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

struct Entry {
    current: CarePlan,
    history: Vec<RevisionRecord>,
}

/// Process-local store. Each record has its own mutex; the map lock is only held to find it.
#[derive(Default)]
pub struct InMemoryCarePlanStore {
    records: RwLock<HashMap<ShardableUuid, Arc<Mutex<Entry>>>>,
}

impl InMemoryCarePlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &ShardableUuid) -> CarePlanResult<Arc<Mutex<Entry>>> {
        let records = self.records.read().map_err(|_| CarePlanError::LockPoisoned)?;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| CarePlanError::NotFound(id.to_string()))
    }

    fn snapshot(&self) -> CarePlanResult<Vec<CarePlan>> {
        let entries: Vec<_> = {
            let records = self.records.read().map_err(|_| CarePlanError::LockPoisoned)?;
            records.values().cloned().collect()
        };
        entries
            .iter()
            .map(|entry| {
                entry
                    .lock()
                    .map(|e| e.current.clone())
                    .map_err(|_| CarePlanError::LockPoisoned)
            })
            .collect()
    }
}

impl CarePlanStore for InMemoryCarePlanStore {
    fn insert(&self, careplan: &CarePlan, change: &ChangeContext) -> CarePlanResult<()> {
        let mut records = self.records.write().map_err(|_| CarePlanError::LockPoisoned)?;
        if records.contains_key(&careplan.careplan_id) {
            return Err(CarePlanError::AlreadyExists(careplan.careplan_id.to_string()));
        }
        records.insert(
            careplan.careplan_id,
            Arc::new(Mutex::new(Entry {
                current: careplan.clone(),
                history: vec![RevisionRecord::from_change(careplan, change)],
            })),
        );
        Ok(())
    }

    fn get(&self, id: &ShardableUuid) -> CarePlanResult<CarePlan> {
        let entry = self.entry(id)?;
        let guard = entry.lock().map_err(|_| CarePlanError::LockPoisoned)?;
        Ok(guard.current.clone())
    }

    fn list_by_patient(&self, patient_id: &str) -> CarePlanResult<Vec<CarePlan>> {
        let mut plans: Vec<_> = self
            .snapshot()?
            .into_iter()
            .filter(|p| p.patient_id.as_str() == patient_id)
            .collect();
        sort_recent_first(&mut plans);
        Ok(plans)
    }

    fn list_by_status(&self, status: Option<CarePlanStatus>) -> CarePlanResult<Vec<CarePlan>> {
        let mut plans: Vec<_> = self
            .snapshot()?
            .into_iter()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .collect();
        sort_recent_first(&mut plans);
        Ok(plans)
    }

    fn compare_and_swap(
        &self,
        expected: VersionStamp,
        next: &CarePlan,
        change: &ChangeContext,
    ) -> CarePlanResult<()> {
        let entry = self.entry(&next.careplan_id)?;
        let mut guard = entry.lock().map_err(|_| CarePlanError::LockPoisoned)?;
        check_swap(&guard.current, expected, next)?;
        guard.current = next.clone();
        guard.history.push(RevisionRecord::from_change(next, change));
        Ok(())
    }

    fn revisions(&self, id: &ShardableUuid) -> CarePlanResult<Vec<RevisionRecord>> {
        let entry = self.entry(id)?;
        let guard = entry.lock().map_err(|_| CarePlanError::LockPoisoned)?;
        Ok(guard.history.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChangeAction;
    use crate::test_support::{change, draft};

    #[test]
    fn insert_then_get() {
        let store = InMemoryCarePlanStore::new();
        let plan = draft("patient-1");
        store.insert(&plan, &change(ChangeAction::Create)).unwrap();

        assert_eq!(store.get(&plan.careplan_id).unwrap(), plan);
        assert!(matches!(
            store.insert(&plan, &change(ChangeAction::Create)),
            Err(CarePlanError::AlreadyExists(_))
        ));
    }

    #[test]
    fn get_unknown_is_not_found() {
        let store = InMemoryCarePlanStore::new();
        assert!(matches!(
            store.get(&ShardableUuid::new()),
            Err(CarePlanError::NotFound(_))
        ));
    }

    #[test]
    fn compare_and_swap_rejects_stale_stamp() {
        let store = InMemoryCarePlanStore::new();
        let plan = draft("patient-1");
        store.insert(&plan, &change(ChangeAction::Create)).unwrap();

        let mut next = plan.clone();
        next.status = CarePlanStatus::UnderReview;
        next.revision = 2;
        store
            .compare_and_swap(plan.stamp(), &next, &change(ChangeAction::SubmitForReview))
            .unwrap();

        let mut again = next.clone();
        again.revision = 2;
        let err = store
            .compare_and_swap(plan.stamp(), &again, &change(ChangeAction::SubmitForReview))
            .unwrap_err();
        match err {
            CarePlanError::StaleVersion {
                expected, actual, ..
            } => {
                assert_eq!(expected, VersionStamp::new(1, 1));
                assert_eq!(actual, VersionStamp::new(1, 2));
            }
            other => panic!("expected StaleVersion, got {other:?}"),
        }

        let revisions = store.revisions(&plan.careplan_id).unwrap();
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[1].action, ChangeAction::SubmitForReview);
    }

    #[test]
    fn concurrent_swaps_on_one_stamp_admit_exactly_one() {
        let store = InMemoryCarePlanStore::new();
        let plan = draft("patient-1");
        store.insert(&plan, &change(ChangeAction::Create)).unwrap();

        let mut next = plan.clone();
        next.status = CarePlanStatus::UnderReview;
        next.revision = 2;

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        store.compare_and_swap(
                            plan.stamp(),
                            &next,
                            &change(ChangeAction::SubmitForReview),
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, CarePlanError::StaleVersion { .. })));
    }

    #[test]
    fn lists_filter_and_order_by_recency() {
        let store = InMemoryCarePlanStore::new();
        let older = draft("patient-1");
        let mut newer = draft("patient-1");
        newer.last_modified = older.last_modified + chrono::Duration::seconds(5);
        let other = draft("patient-2");
        for p in [&older, &newer, &other] {
            store.insert(p, &change(ChangeAction::Create)).unwrap();
        }

        let mine = store.list_by_patient("patient-1").unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].careplan_id, newer.careplan_id);

        assert_eq!(store.list_by_status(None).unwrap().len(), 3);
        assert!(store
            .list_by_status(Some(CarePlanStatus::UnderReview))
            .unwrap()
            .is_empty());
    }
}
