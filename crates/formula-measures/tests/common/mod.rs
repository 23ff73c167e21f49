#![allow(dead_code)]

//! Model documents shared by the integration tests.

use formula_measures::MeasureContainer;

/// Command text as written by the model designer below the batching level: the placeholder
/// preamble, then every measure with its KPI helpers.
pub const LEGACY_COMMAND_TEXT: &str = "CALCULATE;
CREATE MEMBER CURRENTCUBE.Measures.[__No measures defined] AS 1, VISIBLE = 0;
ALTER CUBE CURRENTCUBE UPDATE DIMENSION Measures, Default_Member = [__No measures defined];
----------------------------------------------------------
-- PowerPivot measures command (do not modify manually) --
----------------------------------------------------------


CREATE MEASURE 'Sales'[Revenue]=SUM('Sales'[Amount]);
CREATE MEASURE 'Sales'[_Revenue Goal]=1000000;
CREATE MEASURE 'Sales'[_Revenue Status]=IF([Revenue] &gt;= [_Revenue Goal], 1, -1);
CREATE KPI CURRENTCUBE.[Revenue] AS Measures.[Revenue], ASSOCIATED_MEASURE_GROUP = 'Sales', GOAL = Measures.[_Revenue Goal], STATUS = Measures.[_Revenue Status], STATUS_GRAPHIC = 'Traffic Light - Single';

CREATE MEASURE 'Sales'[Margin %]=DIVIDE([Profit], [Revenue]) -- share of revenue
;
";

pub const LEGACY_CALCULATION_PROPERTIES: &str = r##"<CalculationProperties>
                  <CalculationProperty>
                    <Annotations>
                      <Annotation>
                        <Name>Format</Name>
                        <Value>
                          <Format Format="Currency" Accuracy="0" xmlns=""><Currency LCID="1033" DisplayName="$ English (United States)" Symbol="$" PositivePattern="0" NegativePattern="0" /></Format>
                        </Value>
                      </Annotation>
                    </Annotations>
                    <CalculationReference>[Revenue]</CalculationReference>
                    <CalculationType>Member</CalculationType>
                    <FormatString>"$"#,0;-"$"#,0;"$"#,0</FormatString>
                    <DisplayFolder>Sales</DisplayFolder>
                  </CalculationProperty>
                  <CalculationProperty>
                    <Annotations>
                      <Annotation>
                        <Name>GoalType</Name>
                        <Value>StaticValue</Value>
                      </Annotation>
                      <Annotation>
                        <Name>KpiStatusType</Name>
                        <Value>Linear</Value>
                      </Annotation>
                    </Annotations>
                    <CalculationReference>KPIs.[Revenue]</CalculationReference>
                    <CalculationType>Member</CalculationType>
                    <Description>Revenue against plan</Description>
                  </CalculationProperty>
                  <CalculationProperty>
                    <CalculationReference>[_Revenue Goal]</CalculationReference>
                    <CalculationType>Member</CalculationType>
                    <FormatString>#,0</FormatString>
                    <Visible>false</Visible>
                    <Description>Annual plan</Description>
                  </CalculationProperty>
                  <CalculationProperty>
                    <CalculationReference>[_Revenue Status]</CalculationReference>
                    <CalculationType>Member</CalculationType>
                    <Visible>false</Visible>
                  </CalculationProperty>
                  <CalculationProperty>
                    <Annotations>
                      <Annotation>
                        <Name>Format</Name>
                        <Value>
                          <Format Format="Percentage" Accuracy="1" xmlns="" />
                        </Value>
                      </Annotation>
                    </Annotations>
                    <CalculationReference>[Margin %]</CalculationReference>
                    <CalculationType>Member</CalculationType>
                    <FormatString>0.0 %;-0.0 %;0.0 %</FormatString>
                    <Description>Profit over revenue</Description>
                  </CalculationProperty>
                  <CalculationProperty>
                    <CalculationReference>Measures.[__No measures defined]</CalculationReference>
                    <CalculationType>Member</CalculationType>
                    <Visible>false</Visible>
                  </CalculationProperty>
                </CalculationProperties>"##;

/// An XML-based model document whose MDX script holds `commands` and, when given,
/// `calculation_properties` (both complete elements).
pub fn xml_model(
    compatibility_level: u32,
    commands: &str,
    calculation_properties: Option<&str>,
) -> String {
    let properties = calculation_properties.unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Batch Transaction="false" xmlns="http://schemas.microsoft.com/analysisservices/2003/engine">
  <Alter AllowCreate="true" ObjectExpansion="ExpandFull">
    <Object>
      <DatabaseID>Model</DatabaseID>
    </Object>
    <ObjectDefinition>
      <Database>
        <ID>Model</ID>
        <Name>Model</Name>
        <CompatibilityLevel>{compatibility_level}</CompatibilityLevel>
        <Dimensions>
          <Dimension>
            <ID>Sales</ID>
            <Name>Sales</Name>
          </Dimension>
        </Dimensions>
        <Cubes>
          <Cube>
            <ID>Model</ID>
            <Name>Model</Name>
            <MdxScripts>
              <MdxScript>
                <ID>MdxScript</ID>
                <Name>MdxScript</Name>
                {commands}
                {properties}
              </MdxScript>
            </MdxScripts>
          </Cube>
        </Cubes>
      </Database>
    </ObjectDefinition>
  </Alter>
</Batch>
"#
    )
}

/// `<Commands>` with a single command holding `text` (already XML-escaped).
pub fn single_command(text: &str) -> String {
    format!("<Commands>\n                  <Command>\n                    <Text>{text}</Text>\n                  </Command>\n                </Commands>")
}

/// The designer-written model below the batching level: `Revenue` with a KPI and `Margin %`.
pub fn legacy_xml_model() -> String {
    xml_model(
        1100,
        &single_command(LEGACY_COMMAND_TEXT),
        Some(LEGACY_CALCULATION_PROPERTIES),
    )
}

/// A JSON-based model with two tables, foreign keys everywhere and a culture translating both
/// `Sales` measures.
pub const JSON_MODEL: &str = r#"{
  "name": "SemanticModel",
  "compatibilityLevel": 1550,
  "model": {
    "culture": "en-US",
    "tables": [
      {
        "name": "Sales",
        "lineageTag": "t-1",
        "columns": [
          { "name": "Amount", "dataType": "decimal", "sourceColumn": "Amount" }
        ],
        "measures": [
          {
            "name": "Revenue",
            "expression": "SUM(Sales[Amount])",
            "formatString": "\\$#,0.00;(\\$#,0.00);\\$#,0.00",
            "lineageTag": "m-1",
            "annotations": [
              { "name": "PBI_FormatHint", "value": "{\"currencyCulture\":\"en-US\"}" },
              { "name": "Format", "value": "<Format Format=\"Currency\" Accuracy=\"2\"><Currency LCID=\"1033\" Symbol=\"$\"/></Format>" }
            ]
          },
          {
            "name": "Orders",
            "expression": [
              "COUNTROWS(",
              "    Sales",
              ")"
            ],
            "isHidden": true,
            "lineageTag": "m-2"
          }
        ],
        "partitions": [
          { "name": "Sales", "mode": "import" }
        ]
      },
      {
        "name": "Date",
        "lineageTag": "t-2",
        "columns": [
          { "name": "Date", "dataType": "dateTime", "sourceColumn": "Date" }
        ]
      }
    ],
    "cultures": [
      {
        "name": "de-DE",
        "translations": {
          "model": {
            "name": "Model",
            "tables": [
              {
                "name": "Sales",
                "measures": [
                  { "name": "Revenue", "translatedCaption": "Umsatz" },
                  { "name": "Orders", "translatedCaption": "Bestellungen" }
                ]
              }
            ]
          }
        }
      }
    ]
  }
}
"#;

/// Names of every measure of `container`, primary and supporting, in order.
pub fn all_names(container: &MeasureContainer) -> Vec<&str> {
    container.all_measures().iter().map(|m| m.name()).collect()
}

/// Names of the primary measures of `container`.
pub fn primary_names(container: &MeasureContainer) -> Vec<&str> {
    container.measures().map(|m| m.name()).collect()
}
