//! Full jobs from JSON configuration and menu definitions down to Arrow
//! files on disk.

use arrow::array::Int64Array;
use arrow::ipc::reader::FileReader;
use blockflow::config::JobConfig;
use blockflow::job::Job;
use blockflow::menu::{Menu, MenuMsg};
use pretty_assertions::assert_eq;
use std::fs::File;
use std::path::Path;

const MENU: &str = r#"{
  "name": "split",
  "graphs": [
    {
      "name": "split",
      "nodes": [
        { "name": "parse", "parents": ["initial"], "algos": ["csvparser", "count"] },
        { "name": "left", "parents": ["parse"], "algos": ["keep_ab"] },
        { "name": "right", "parents": ["parse"], "algos": ["keep_ab"] },
        { "name": "both", "parents": ["left", "right"], "algos": ["concat"] },
        { "name": "bonly", "parents": ["parse"], "algos": ["drop_a"] }
      ]
    }
  ]
}"#;

fn write_input(dir: &Path, name: &str, first: i64) -> String {
    let mut text = String::from("a,b,c\n");
    for i in first..first + 10 {
        text.push_str(&format!("{},{},{}\n", i, i * 10, i * 100));
    }
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path.display().to_string()
}

fn config(dir: &Path, max_malloc: u64) -> JobConfig {
    let inputs = [
        write_input(dir, "one.csv", 0),
        write_input(dir, "two.csv", 10),
    ];
    let text = format!(
        r#"{{
          "name": "split",
          "job_id": "t1",
          "path": {out:?},
          "max_malloc": {max_malloc},
          "sampler": {{ "ndatums": 1, "nchunks": 1 }},
          "input": {{
            "files": [{one:?}, {two:?}],
            "filehandler": {{ "blocksize": 24 }}
          }},
          "algos": [
            {{ "name": "csvparser", "klass": "CsvParserAlgo" }},
            {{ "name": "count", "klass": "PassthroughAlgo" }},
            {{ "name": "keep_ab", "klass": "FilterColumnsAlgo",
               "properties": [{{ "name": "columns", "type": "list", "value": "['a', 'b']" }}] }},
            {{ "name": "drop_a", "klass": "FilterColumnsAlgo",
               "properties": [
                 {{ "name": "columns", "type": "list", "value": "['a', 'c']" }},
                 {{ "name": "invert", "type": "bool", "value": "True" }}
               ] }},
            {{ "name": "concat", "klass": "ConcatAlgo" }}
          ],
          "tools": [
            {{ "name": "bufferwriter", "klass": "BufferOutputWriter",
               "properties": [{{ "name": "write_csv", "type": "bool", "value": "True" }}] }}
          ]
        }}"#,
        out = dir.join("out").display().to_string(),
        one = inputs[0],
        two = inputs[1],
    );
    JobConfig::from_json(&text).unwrap()
}

fn menu() -> Menu {
    Menu::from_definition(&MenuMsg::from_json(MENU).unwrap()).unwrap()
}

/// Row count and first-column values of every `.arrow` file of a writer.
fn read_back(dir: &Path, prefix: &str) -> (usize, Vec<i64>) {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|n| n.starts_with(prefix) && n.ends_with(".arrow"))
        .collect();
    names.sort();

    let mut rows = 0;
    let mut first = Vec::new();
    for name in &names {
        let reader = FileReader::try_new(File::open(dir.join(name)).unwrap(), None).unwrap();
        for batch in reader {
            let batch = batch.unwrap();
            rows += batch.num_rows();
            let col = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
            first.extend(col.values().iter().copied());
        }
    }
    (names.len(), first)
}

#[test]
fn runs_every_block_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut job = Job::new(config(dir.path(), u64::MAX), menu());
    let summary = job.control().unwrap();

    // 20 rows reach each leaf; "both" carries them twice.
    assert_eq!(summary.total_records, 60);
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.ncollects, 1);
    assert_eq!(summary.ndatums, 1);
    assert!(summary.nchunks > 2);

    let out = dir.path().join("out");
    let (files, b_values) = read_back(&out, "t1_writer_bonly_");
    assert_eq!(files, 1);
    let want: Vec<i64> = (0..20).map(|i| i * 10).collect();
    assert_eq!(b_values, want);

    let (_, both) = read_back(&out, "t1_writer_both_");
    assert_eq!(both.len(), 40);

    let sidecar = std::fs::read_to_string(out.join("t1_writer_bonly_0.arrow.csv")).unwrap();
    assert!(sidecar.starts_with("b\n0\n10\n"));
    assert!(job.meta_path().exists());
}

#[test]
fn low_memory_ceiling_drains_after_every_block() {
    let dir = tempfile::tempdir().unwrap();
    let mut job = Job::new(config(dir.path(), 0), menu());
    let summary = job.control().unwrap();

    // The sampled chunk is steered but flushed before the run begins.
    let run_chunks = summary.nchunks - 1;
    assert_eq!(summary.ncollects, run_chunks);
    assert_eq!(summary.total_records, 60);
    assert!(summary.peak_malloc > 0);

    let names: Vec<&str> = summary.timers.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains(&"steer.time.csvparser"));
    assert!(names.contains(&"collector.time.collect"));
    assert!(
        summary
            .histograms
            .iter()
            .any(|h| h.name == "count.nrows" && h.entries == run_chunks as u64)
    );
}

#[test]
fn menu_without_a_configured_algorithm_fails_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), u64::MAX);
    config.algos.retain(|a| a.name != "concat");

    let mut job = Job::new(config, menu());
    let err = job.control().unwrap_err();
    assert!(matches!(err, blockflow::Error::AlgoNotFound(ref name) if name == "concat"));
    assert!(!dir.path().join("out").exists());
}
