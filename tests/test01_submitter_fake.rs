use std::sync::{Arc, Mutex};
use std::time::Duration;

use sql_tasks::DEFAULT_TIMEOUT_SECONDS;
use sql_tasks::prelude::*;
use sql_tasks::test_utils::{FakeLog, FakePool, PreparedKind};

type Outcomes = Arc<Mutex<Vec<Result<usize, SqlTaskError>>>>;

fn recorder(outcomes: &Outcomes) -> impl FnOnce(Result<usize, SqlTaskError>) + Send + 'static {
    let outcomes = Arc::clone(outcomes);
    move |outcome| outcomes.lock().unwrap().push(outcome)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_task_gets_exactly_one_callback() -> Result<(), SqlTaskError> {
    let log = FakeLog::shared();
    log.lock().unwrap().fail_on = Some("bad_table".into());
    let config = ExecutorConfig {
        num_threads: 3,
        ..ExecutorConfig::default()
    };
    let (submitter, mut queue) =
        TaskSubmitter::with_main_loop(Arc::new(FakePool::new(log.clone())), &config)?;

    let outcomes: Outcomes = Arc::default();
    for i in 0..20 {
        let table = if i % 4 == 0 { "bad_table" } else { "good_table" };
        let sql = format!("UPDATE {table} SET n = {i}");
        submitter.submit_statement_task(
            move |stmt| stmt.execute_update(&sql),
            recorder(&outcomes),
        )?;
    }

    // Callbacks only run when the host drains its queue.
    let mut delivered = 0;
    while delivered < 20 {
        delivered += queue.finish_pending(&config.drain_budget());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 20);
    assert_eq!(outcomes.iter().filter(|o| o.is_err()).count(), 5);
    let log = log.lock().unwrap();
    assert_eq!(log.acquired, 20);
    assert_eq!(log.connections_closed, 20);
    assert_eq!(log.open_statements(), 0);
    assert!(log.timeouts.iter().all(|t| *t == DEFAULT_TIMEOUT_SECONDS));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closed_pool_fails_tasks_through_their_futures() -> Result<(), SqlTaskError> {
    let log = FakeLog::shared();
    let pool = Arc::new(FakePool::new(log.clone()));
    let (submitter, queue) = TaskSubmitter::with_main_loop(pool.clone(), &ExecutorConfig::default())?;
    let drain = tokio::spawn(queue.run(Duration::from_millis(1), DrainBudget::unlimited()));

    pool.close();
    let err = submitter
        .submit_connection_task_future(|_conn| Ok(()))?
        .await
        .unwrap_err();
    assert!(matches!(err, SqlTaskError::PoolClosed));
    assert_eq!(log.lock().unwrap().acquired, 0);

    drop(submitter);
    drain.await.unwrap();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn configured_tasks_keep_their_settings() -> Result<(), SqlTaskError> {
    let log = FakeLog::shared();
    let submitter = TaskSubmitter::new(
        Arc::new(FakePool::new(log.clone())),
        Arc::new(BlockingExecutor::current(2)?),
        Arc::new(RuntimeExecutor::current()?),
    );

    let keys = submitter
        .submit_future(|callback| {
            Ok(SqlTask::prepared(
                "INSERT INTO players (name) VALUES (?1)",
                |stmt| {
                    stmt.set_param(1, RowValues::Text("alex".into()))?;
                    stmt.execute_update()
                },
                callback,
            )?
            .with_preparation_strategy(PreparationStrategy::with_column_names(["id"])?)
            .with_priority(Priority::High)
            .with_timeout(30)?)
        })?
        .await?;
    assert_eq!(keys, 1);

    let log = log.lock().unwrap();
    assert_eq!(log.prepared, vec![PreparedKind::Names(vec!["id".into()])]);
    assert_eq!(log.timeouts, vec![30]);
    Ok(())
}

#[test]
fn futures_can_be_waited_on_without_a_runtime() {
    let log = FakeLog::shared();
    let submitter = TaskSubmitter::new(
        Arc::new(FakePool::new(log)),
        Arc::new(InlineExecutor),
        Arc::new(InlineExecutor),
    );
    let value = submitter
        .submit_callable_statement_task_future("CALL next_id(?1)", |stmt| {
            stmt.set_param(1, RowValues::Int(41))?;
            stmt.execute_update()?;
            stmt.out_value(1)
        })
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(value.as_int(), Some(&41));
}
