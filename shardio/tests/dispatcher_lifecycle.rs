mod common;

use std::sync::Arc;

use common::{TestDirectory, path_of, random_bytes, temp_file_with};
use shardio::{
    Directory, Dispatcher, DispatcherConfig, InProcessDirectory, OpenMode, PartitionOptions,
    ShardConfig, ShardError,
};

fn config(path: &str, mode: OpenMode, name: &str, partitions: usize) -> DispatcherConfig {
    DispatcherConfig::new(path, mode, name, partitions)
}

#[tokio::test]
async fn test_creator_destroy_unregisters_every_name() -> anyhow::Result<()> {
    let tmp = temp_file_with(&random_bytes(300));
    let directory = Arc::new(TestDirectory::new());
    let dispatcher = Dispatcher::create(
        directory.clone(),
        config(&path_of(&tmp), OpenMode::Read, "/life/a", 3),
        PartitionOptions::default(),
    )
    .await?;
    assert!(dispatcher.is_created());
    assert_eq!(
        directory.inner.names().await,
        vec!["/life/a", "/life/a/0", "/life/a/1", "/life/a/2"]
    );

    dispatcher.destroy().await?;
    assert_eq!(directory.unregister_calls(), 4);
    assert!(directory.inner.names().await.is_empty());
    for unit in directory.created_units() {
        assert!(!unit.is_open().await?);
    }
    Ok(())
}

#[tokio::test]
async fn test_attached_destroy_leaves_registration() -> anyhow::Result<()> {
    let data = random_bytes(900);
    let tmp = temp_file_with(&data);
    let directory = Arc::new(TestDirectory::new());
    let owner = Dispatcher::create(
        directory.clone(),
        config(&path_of(&tmp), OpenMode::ReadWrite, "/life/shared/", 3),
        PartitionOptions::default(),
    )
    .await?;

    let attached = Dispatcher::connect(directory.clone(), "/life/shared/").await?;
    assert!(!attached.is_created());
    assert!(attached.is_open());
    assert_eq!(attached.file_size(), 900);
    assert_eq!(attached.read_at(100, 700).await?, &data[100..800]);

    // both handles drive the same units
    attached.write_at(299, &b"XY"[..]).await?;
    assert_eq!(owner.read_at(298, 4).await?, [data[298], b'X', b'Y', data[301]]);

    attached.destroy().await?;
    assert_eq!(directory.unregister_calls(), 0);
    assert_eq!(directory.inner.names().await.len(), 4);
    assert_eq!(owner.read_at(0, 10).await?, &data[..10]);

    owner.destroy().await?;
    assert_eq!(directory.unregister_calls(), 4);
    Ok(())
}

#[tokio::test]
async fn test_connect_to_unknown_name_fails() {
    let directory = Arc::new(InProcessDirectory::default());
    assert!(matches!(
        Dispatcher::connect(directory, "/life/nobody").await,
        Err(ShardError::NameNotFound(_))
    ));
}

#[tokio::test]
async fn test_failed_open_rolls_back() -> anyhow::Result<()> {
    let tmp = temp_file_with(&random_bytes(64));
    let directory = Arc::new(TestDirectory::new().failing_open_on(1));
    let err = Dispatcher::create(
        directory.clone(),
        config(&path_of(&tmp), OpenMode::Read, "/life/broken", 3),
        PartitionOptions::default(),
    )
    .await
    .err()
    .expect("create must fail");
    assert!(matches!(err, ShardError::OpenFailure { partition: 1, .. }));

    assert!(directory.inner.names().await.is_empty());
    let units = directory.created_units();
    assert_eq!(units.len(), 3);
    for unit in units {
        assert!(!unit.is_open().await?);
    }
    Ok(())
}

#[tokio::test]
async fn test_missing_file_for_read_is_open_failure() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("absent.bin");
    let directory = Arc::new(InProcessDirectory::default());
    let result = Dispatcher::create(
        directory.clone(),
        config(path.to_str().unwrap(), OpenMode::Read, "/life/absent", 2),
        PartitionOptions::default(),
    )
    .await;
    match result {
        Err(ShardError::OpenFailure { partition, path: failed, .. }) => {
            assert_eq!(partition, 0);
            assert_eq!(failed, path);
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("opening a missing file for reading succeeded"),
    }
    assert!(directory.names().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_name_collision_keeps_first_dispatcher() -> anyhow::Result<()> {
    let tmp = temp_file_with(&random_bytes(128));
    let directory = Arc::new(InProcessDirectory::default());
    let first = Dispatcher::create(
        directory.clone(),
        config(&path_of(&tmp), OpenMode::Read, "/life/dup", 2),
        PartitionOptions::default(),
    )
    .await?;
    let second = Dispatcher::create(
        directory.clone(),
        config(&path_of(&tmp), OpenMode::Read, "/life/dup", 2),
        PartitionOptions::default(),
    )
    .await;
    assert!(matches!(second, Err(ShardError::NameTaken(_))));
    assert_eq!(directory.names().await.len(), 3);
    assert_eq!(first.read_at(0, 128).await?.len(), 128);

    first.destroy().await?;
    Ok(())
}

#[tokio::test]
async fn test_invalid_construction_arguments() {
    let directory = Arc::new(InProcessDirectory::default());
    let zero = Dispatcher::create(
        directory.clone(),
        config("/tmp/unused", OpenMode::Read, "/life/zero", 0),
        PartitionOptions::default(),
    )
    .await;
    assert!(matches!(zero, Err(ShardError::InvalidArgument(_))));

    let no_chunk = Dispatcher::create(
        directory.clone(),
        config("/tmp/unused", OpenMode::Read, "/life/nochunk", 1),
        PartitionOptions {
            chunk_size: 0,
            lazy_writes: true,
        },
    )
    .await;
    assert!(matches!(no_chunk, Err(ShardError::InvalidArgument(_))));
    assert!(directory.names().await.is_empty());
}

#[tokio::test]
async fn test_reopen_switches_file_and_layout() -> anyhow::Result<()> {
    let small = random_bytes(100);
    let large = random_bytes(4000);
    let tmp_small = temp_file_with(&small);
    let tmp_large = temp_file_with(&large);
    let directory = Arc::new(InProcessDirectory::default());
    let mut dispatcher = Dispatcher::create(
        directory.clone(),
        config(&path_of(&tmp_small), OpenMode::Read, "/life/reopen", 4),
        PartitionOptions::default(),
    )
    .await?;
    assert_eq!(dispatcher.layout().bytes_per_partition, 25);

    dispatcher.read(10).await?;
    dispatcher.open(&path_of(&tmp_large), OpenMode::Read).await?;
    assert_eq!(dispatcher.file_size(), 4000);
    assert_eq!(dispatcher.layout().bytes_per_partition, 1000);
    assert_eq!(dispatcher.tell(), 0);
    assert_eq!(dispatcher.read_at(990, 20).await?, &large[990..1010]);
    assert_eq!(dispatcher.config().file_name, path_of(&tmp_large));

    let attached = Dispatcher::connect(directory.clone(), "/life/reopen").await?;
    assert_eq!(attached.config().file_name, path_of(&tmp_large));
    assert_eq!(attached.file_size(), 4000);
    attached.destroy().await?;

    dispatcher.destroy().await?;
    assert!(directory.names().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_append_mode_starts_at_end() -> anyhow::Result<()> {
    let tmp = temp_file_with(b"0123456789");
    let directory = Arc::new(InProcessDirectory::default());
    let dispatcher = Dispatcher::create(
        directory.clone(),
        config(&path_of(&tmp), OpenMode::AppendRead, "/life/append", 2),
        PartitionOptions::default(),
    )
    .await?;
    assert_eq!(dispatcher.tell(), 10);
    assert_eq!(dispatcher.file_size(), 10);

    // an attached dispatcher starts where the creator did
    let attached = Dispatcher::connect(directory.clone(), "/life/append").await?;
    assert_eq!(attached.tell(), 10);
    attached.destroy().await?;
    dispatcher.destroy().await?;
    Ok(())
}

#[tokio::test]
async fn test_dispatcher_from_yaml_config() -> anyhow::Result<()> {
    let data = random_bytes(2000);
    let tmp = temp_file_with(&data);
    let yaml = format!(
        "file_name: {}\nmode: r\nsymbolic_name: /life/yaml\npartition_count: 5\n\
         partition:\n  chunk_size: 256\n",
        path_of(&tmp)
    );
    let cfg_file = temp_file_with(yaml.as_bytes());
    let shard = shardio::load_config(cfg_file.path())?;
    assert_eq!(shard, ShardConfig::from_yaml(&yaml)?);

    let directory: Arc<dyn Directory> = Arc::new(InProcessDirectory::new(2));
    let dispatcher =
        Dispatcher::create(directory, shard.dispatcher(), shard.partition.clone()).await?;
    assert_eq!(dispatcher.partitions().len(), 5);
    assert_eq!(dispatcher.read_at(0, 2000).await?, data);
    dispatcher.destroy().await?;
    Ok(())
}
