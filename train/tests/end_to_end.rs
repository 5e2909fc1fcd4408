use anyhow::Result;
use image::{Rgb, RgbImage};
use std::{fs, path::Path, sync::Arc};
use train::{config::Config, logging::TrainingOutputLog};

fn write_fixture(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir.join("images"))?;

    let mut label_text = String::new();
    for index in 0..5 {
        let name = format!("face{}.png", index);
        let image = RgbImage::from_fn(80, 64, |x, y| {
            Rgb([(x * 3) as u8, (y * 3) as u8, (index * 40) as u8])
        });
        image.save(dir.join("images").join(&name))?;

        label_text.push_str(&format!("# {}\n", name));
        label_text.push_str(
            "20 12 30 30 27.0 22.0 0.0 43.0 22.0 0.0 35.0 30.0 0.0 29.0 36.0 0.0 41.0 36.0 0.0 0.9\n",
        );
        label_text.push_str("50 30 12 14\n");
    }
    fs::write(dir.join("label.txt"), label_text)?;
    Ok(())
}

fn config_text(dir: &Path) -> String {
    format!(
        r#"{{
    dataset: {{ label_file: "{label_file}" }},
    anchor: {{ image_size: 64, steps: [8, 16, 32], min_sizes: [[16, 32], [64, 128], [256, 512]] }},
    encoder: {{ variance: [0.1, 0.2], match_thresh: 0.35 }},
    preprocessor: {{ rgb_mean: [123.0, 117.0, 104.0], crop_attempts: 50, crop_scales: [0.6, 0.8, 1.0] }},
    loss: {{ num_classes: 2, neg_pos_ratio: 7, loc_weight: 2.0, class_weight: 1.0, landm_weight: 1.0 }},
    training: {{
        batch_size: 2,
        epochs: 3,
        seed: 5,
        num_workers: 2,
        backbone: "MobileNet025",
        optimizer: {{ type: "Sgd", weight_decay: 5e-4 }},
        lr_schedule: {{ type: "Cosine", initial_lr: 0.01, end_lr: 0.001, warmup_epochs: 1 }},
        device: "cpu",
    }},
    logging: {{ dir: "{logging_dir}" }},
}}"#,
        label_file = dir.join("label.txt").display(),
        logging_dir = dir.join("logs").display(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn train_from_label_file() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("train-end-to-end-{}", std::process::id()));
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    write_fixture(&dir)?;

    let config = Config::from_json5(&config_text(&dir))?;
    train::start(Arc::new(config)).await?;

    // one timestamped directory per run
    let run_dirs: Vec<_> = fs::read_dir(dir.join("logs"))?.collect::<Result<_, _>>()?;
    assert_eq!(run_dirs.len(), 1);
    let run_dir = run_dirs[0].path();
    assert!(run_dir.join("config.json5").is_file());

    // 5 records make 2 batches per epoch
    let text = fs::read_to_string(run_dir.join("metrics.jsonl"))?;
    let outputs: Vec<TrainingOutputLog> = text
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(outputs.len(), 6);
    assert_eq!(
        outputs.iter().map(|output| output.step).collect::<Vec<_>>(),
        (0..6).collect::<Vec<_>>()
    );
    assert_eq!(
        outputs.iter().map(|output| output.epoch).collect::<Vec<_>>(),
        vec![0, 0, 1, 1, 2, 2]
    );
    assert!(outputs.iter().all(|output| output.total_loss.is_finite()));
    assert!((outputs[5].lr - 0.001).abs() < 1e-9);

    fs::remove_dir_all(&dir)?;
    Ok(())
}
